// =============================================================================
// Metrics calculator — stateless snapshot derivation
// =============================================================================
//
// Pure functions over a store's current view; no metric calculator here ever
// mutates the store. The per-field calculators live in sibling modules and
// are combined here into one `MetricsSnapshot`.

pub mod atr;
pub mod candle_structure;
pub mod orderbook;
pub mod volume;

use chrono::{DateTime, Utc};

use crate::model::{BookSnap, Candle, MetricsSnapshot, SweepSide};
use crate::store::InstrumentStore;

/// Compute the full metrics snapshot for `candle` against `store`'s rolling
/// history for `timeframe`, using the order book held in the store (if any).
///
/// `candle` must already have been accepted into the store (its bars/volume
/// rings include it) before calling this.
pub fn compute(
    store: &InstrumentStore,
    candle: &Candle,
    timeframe: &str,
    atr_period: usize,
    rvol_period: usize,
    ob_max_levels: usize,
    ob_depletion_threshold: f64,
    ob_imbalance_threshold: f64,
) -> MetricsSnapshot {
    let bars = store.bars(timeframe);
    let volumes = store.volumes(timeframe);

    let atr_value = atr::atr(&bars, atr_period);
    let natr = atr::natr_pct(atr_value, candle.close);
    let rvol_value = volume::rvol(candle.volume, &volumes, rvol_period);
    let pinbar = candle_structure::detect_pinbar(candle);

    let (sweep_detected, sweep_side, imb_long, imb_short) =
        match (&store.prev_book, &store.curr_book) {
            (Some(prev), Some(curr)) => {
                let (swept, side) = orderbook::detect_sweep(
                    prev,
                    curr,
                    ob_max_levels,
                    ob_depletion_threshold,
                    ob_imbalance_threshold,
                );
                let imb = orderbook::imbalance(curr, ob_max_levels);
                (swept, side, imb.long, imb.short)
            }
            (None, Some(curr)) => {
                let imb = orderbook::imbalance(curr, ob_max_levels);
                (false, SweepSide::None, imb.long, imb.short)
            }
            _ => (false, SweepSide::None, None, None),
        };

    MetricsSnapshot {
        ts: candle.ts,
        atr: atr_value,
        natr_pct: natr,
        rvol: rvol_value,
        pinbar,
        ob_sweep_detected: sweep_detected,
        ob_sweep_side: sweep_side,
        ob_imbalance_long: imb_long,
        ob_imbalance_short: imb_short,
    }
}

/// Build an empty snapshot timestamped `ts`, used when a tick has no
/// associated candle (book-only updates never trigger breakout evaluation
/// directly but the engine still needs a timestamped placeholder).
pub fn empty(ts: DateTime<Utc>) -> MetricsSnapshot {
    MetricsSnapshot {
        ts,
        atr: None,
        natr_pct: None,
        rvol: None,
        pinbar: crate::model::Pinbar::None,
        ob_sweep_detected: false,
        ob_sweep_side: SweepSide::None,
        ob_imbalance_long: None,
        ob_imbalance_short: None,
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

    fn candle(ts_val: i64, close: f64) -> Candle {
        Candle::new(ts(ts_val), close, close + 1.0, close - 1.0, close, 10.0, true).unwrap()
    }

    #[test]
    fn insufficient_history_yields_none_atr_and_rvol() {
        let mut store = InstrumentStore::new(50, 50);
        let c = candle(0, 100.0);
        store.upsert_bar("1m", c);
        let snapshot = compute(&store, &c, "1m", 14, 20, 5, 0.2, 1.5);
        assert!(snapshot.atr.is_none());
        assert!(snapshot.rvol.is_none());
        assert!(!snapshot.is_sufficient());
    }

    #[test]
    fn sufficient_history_produces_full_snapshot() {
        let mut store = InstrumentStore::new(50, 50);
        let mut last = candle(0, 100.0);
        for i in 1..25 {
            last = candle(i * 60, 100.0 + i as f64 * 0.1);
            store.upsert_bar("1m", last);
        }
        let snapshot = compute(&store, &last, "1m", 14, 20, 5, 0.2, 1.5);
        assert!(snapshot.atr.is_some());
        assert!(snapshot.rvol.is_some());
        assert!(snapshot.is_sufficient());
    }

    #[test]
    fn no_sweep_without_a_previous_book() {
        let mut store = InstrumentStore::new(50, 50);
        let book = BookSnap::new(ts(0), vec![BookLevel::new(100.0, 1.0).unwrap()], vec![BookLevel::new(101.0, 1.0).unwrap()]).unwrap();
        store.set_book(book);
        let c = candle(0, 100.0);
        let snapshot = compute(&store, &c, "1m", 14, 20, 5, 0.2, 1.5);
        assert!(!snapshot.ob_sweep_detected);
        assert!(snapshot.ob_imbalance_long.is_some());
    }
}
