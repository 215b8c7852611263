// =============================================================================
// Tick ingest & validation
// =============================================================================
//
// Layered validate-then-normalize-then-store flow: malformed ticks are
// rejected, stale or out-of-order ones are skipped, and only what survives
// is written into the instrument store.

use chrono::{DateTime, Utc};

use crate::errors::DataQualityKind;
use crate::metrics_calc::atr;
use crate::model::{BookSnap, Candle};
use crate::store::InstrumentStore;
use crate::time;

/// Outcome of one ingest call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IngestOutcome {
    Accepted { last_price_updated: Option<f64> },
    Skipped(SkipReason),
    Rejected(DataQualityKind),
}

/// Why a tick was skipped without being treated as a data-quality defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Duplicate,
    Stale,
    OutOfOrder,
}

/// Tunable knobs for the spike filter and staleness bounds.
#[derive(Debug, Clone, Copy)]
pub struct IngestConfig {
    pub atr_period: usize,
    pub spike_filter_enable: bool,
    pub spike_atr_multiplier: f64,
    pub spike_fallback_pct: f64,
    pub max_age_seconds: i64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            atr_period: 14,
            spike_filter_enable: true,
            spike_atr_multiplier: 10.0,
            spike_fallback_pct: 0.5,
            max_age_seconds: time::DEFAULT_MAX_AGE_SECONDS,
        }
    }
}

/// Ingest a candle update for `timeframe` into `store`.
pub fn ingest_candle(
    store: &mut InstrumentStore,
    candle: Candle,
    timeframe: &str,
    cfg: &IngestConfig,
    now: DateTime<Utc>,
) -> IngestOutcome {
    if let Some(existing) = store.existing_bar_at(timeframe, candle.ts) {
        if !candle.is_closed && existing.is_closed {
            return IngestOutcome::Skipped(SkipReason::Duplicate);
        }
    } else if let Some(newest_closed) = store.newest_closed_bar(timeframe) {
        if candle.ts < newest_closed.ts {
            return IngestOutcome::Skipped(SkipReason::Stale);
        }
    }

    if cfg.spike_filter_enable {
        if let Some(last_price) = store.last_price {
            if last_price > 0.0 {
                let bars = store.bars(timeframe);
                let bound = match atr::atr(&bars, cfg.atr_period) {
                    Some(atr_value) => (atr_value * cfg.spike_atr_multiplier).max(cfg.spike_fallback_pct * last_price),
                    None => cfg.spike_fallback_pct * last_price,
                };
                for price in [candle.open, candle.high, candle.low, candle.close] {
                    if (price - last_price).abs() > bound {
                        return IngestOutcome::Rejected(DataQualityKind::SpikeFiltered);
                    }
                }
            }
        }
    }

    if !time::is_within_age_bounds(candle.ts, now, cfg.max_age_seconds) {
        return IngestOutcome::Rejected(DataQualityKind::Temporal);
    }

    store.upsert_bar(timeframe, candle);
    store.set_last_price(candle.close, candle.ts);
    IngestOutcome::Accepted {
        last_price_updated: Some(candle.close),
    }
}

/// Ingest an order book snapshot into `store`.
pub fn ingest_book(store: &mut InstrumentStore, book: BookSnap) -> IngestOutcome {
    if let Some(curr) = &store.curr_book {
        if book.ts < curr.ts {
            return IngestOutcome::Skipped(SkipReason::OutOfOrder);
        }
    }
    if book.bids.is_empty() || book.asks.is_empty() {
        return IngestOutcome::Rejected(DataQualityKind::Partial);
    }

    let mid = book.mid();
    store.set_book(book);
    IngestOutcome::Accepted {
        last_price_updated: mid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BookLevel;
    use chrono::TimeZone;

    fn ts(s: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(s, 0).unwrap()
    }

    fn candle(ts_val: i64, close: f64, closed: bool) -> Candle {
        Candle::new(ts(ts_val), close, close + 1.0, close - 1.0, close, 10.0, closed).unwrap()
    }

    #[test]
    fn first_candle_is_accepted() {
        let mut store = InstrumentStore::new(50, 50);
        let cfg = IngestConfig::default();
        let outcome = ingest_candle(&mut store, candle(0, 100.0, true), "1m", &cfg, ts(0));
        assert_eq!(
            outcome,
            IngestOutcome::Accepted {
                last_price_updated: Some(100.0)
            }
        );
    }

    #[test]
    fn stale_candle_before_newest_closed_is_skipped() {
        let mut store = InstrumentStore::new(50, 50);
        let cfg = IngestConfig::default();
        ingest_candle(&mut store, candle(60, 101.0, true), "1m", &cfg, ts(60));
        let outcome = ingest_candle(&mut store, candle(0, 99.0, true), "1m", &cfg, ts(60));
        assert_eq!(outcome, IngestOutcome::Skipped(SkipReason::Stale));
    }

    #[test]
    fn in_progress_update_replaces_same_ts_bar() {
        let mut store = InstrumentStore::new(50, 50);
        let cfg = IngestConfig::default();
        ingest_candle(&mut store, candle(0, 100.0, false), "1m", &cfg, ts(0));
        let outcome = ingest_candle(&mut store, candle(0, 100.5, true), "1m", &cfg, ts(0));
        assert!(matches!(outcome, IngestOutcome::Accepted { .. }));
        assert_eq!(store.bars("1m")[0].close, 100.5);
    }

    #[test]
    fn duplicate_open_update_after_close_is_skipped() {
        let mut store = InstrumentStore::new(50, 50);
        let cfg = IngestConfig::default();
        ingest_candle(&mut store, candle(0, 100.0, true), "1m", &cfg, ts(0));
        let outcome = ingest_candle(&mut store, candle(0, 99.0, false), "1m", &cfg, ts(0));
        assert_eq!(outcome, IngestOutcome::Skipped(SkipReason::Duplicate));
    }

    #[test]
    fn spike_beyond_fallback_bound_is_rejected_cold_start() {
        let mut store = InstrumentStore::new(50, 50);
        let cfg = IngestConfig::default();
        ingest_candle(&mut store, candle(0, 100.0, true), "1m", &cfg, ts(0));
        // last_price = 100, fallback bound = 50% -> 50; a jump to 200 close (open diff=100) trips it
        let spike = Candle::new(ts(60), 100.0, 205.0, 95.0, 200.0, 10.0, true).unwrap();
        let outcome = ingest_candle(&mut store, spike, "1m", &cfg, ts(60));
        assert_eq!(outcome, IngestOutcome::Rejected(DataQualityKind::SpikeFiltered));
    }

    #[test]
    fn stale_beyond_max_age_is_rejected() {
        let mut store = InstrumentStore::new(50, 50);
        let cfg = IngestConfig {
            spike_filter_enable: false,
            ..IngestConfig::default()
        };
        let outcome = ingest_candle(&mut store, candle(0, 100.0, true), "1m", &cfg, ts(1000));
        assert_eq!(outcome, IngestOutcome::Rejected(DataQualityKind::Temporal));
    }

    #[test]
    fn out_of_order_book_is_skipped() {
        let mut store = InstrumentStore::new(50, 50);
        let b1 = BookSnap::new(ts(10), vec![BookLevel::new(100.0, 1.0).unwrap()], vec![BookLevel::new(101.0, 1.0).unwrap()]).unwrap();
        ingest_book(&mut store, b1);
        let b2 = BookSnap::new(ts(5), vec![BookLevel::new(99.0, 1.0).unwrap()], vec![BookLevel::new(100.0, 1.0).unwrap()]).unwrap();
        let outcome = ingest_book(&mut store, b2);
        assert_eq!(outcome, IngestOutcome::Skipped(SkipReason::OutOfOrder));
    }

    #[test]
    fn book_update_returns_mid_as_last_price() {
        let mut store = InstrumentStore::new(50, 50);
        let book = BookSnap::new(ts(0), vec![BookLevel::new(100.0, 1.0).unwrap()], vec![BookLevel::new(102.0, 1.0).unwrap()]).unwrap();
        let outcome = ingest_book(&mut store, book);
        assert_eq!(
            outcome,
            IngestOutcome::Accepted {
                last_price_updated: Some(101.0)
            }
        );
    }
}
