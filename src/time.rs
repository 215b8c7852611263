// =============================================================================
// Time semantics — market time is authoritative
// =============================================================================
//
// Wall-clock time is used only to bound staleness at ingest and, logged as a
// fallback, when no market time is available at all. It never participates
// in gating logic.

use chrono::{DateTime, Duration, Utc};

/// Clock-skew grace allowed for future-dated ticks.
pub const FUTURE_SKEW_GRACE_SECONDS: i64 = 60;

/// Default staleness bound for ingest.
pub const DEFAULT_MAX_AGE_SECONDS: i64 = 300;

/// Market time paired with the wall-clock latency observed for it, if any.
/// `latency` is `None` only when no market timestamp was available and the
/// wall-clock fallback was used instead.
#[derive(Debug, Clone, Copy)]
pub struct MarketTime {
    pub effective: DateTime<Utc>,
    pub latency_seconds: Option<f64>,
}

/// Resolve the effective market time for a tick, preferring `market_ts` and
/// falling back to wall-clock only when no market timestamp exists.
pub fn market_time_with_latency(
    market_ts: Option<DateTime<Utc>>,
    wall_clock_now: DateTime<Utc>,
) -> MarketTime {
    match market_ts {
        Some(ts) => MarketTime {
            effective: ts,
            latency_seconds: Some((wall_clock_now - ts).num_milliseconds() as f64 / 1000.0),
        },
        None => MarketTime {
            effective: wall_clock_now,
            latency_seconds: None,
        },
    }
}

/// Whether `ts` is within the acceptable staleness/skew window relative to
/// `now`.
pub fn is_within_age_bounds(ts: DateTime<Utc>, now: DateTime<Utc>, max_age_seconds: i64) -> bool {
    let age = now - ts;
    age <= Duration::seconds(max_age_seconds) && age >= Duration::seconds(-FUTURE_SKEW_GRACE_SECONDS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(s: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(s, 0).unwrap()
    }

    #[test]
    fn uses_market_time_when_present() {
        let mt = market_time_with_latency(Some(ts(100)), ts(105));
        assert_eq!(mt.effective, ts(100));
        assert_eq!(mt.latency_seconds, Some(5.0));
    }

    #[test]
    fn falls_back_to_wall_clock_with_no_latency() {
        let mt = market_time_with_latency(None, ts(200));
        assert_eq!(mt.effective, ts(200));
        assert_eq!(mt.latency_seconds, None);
    }

    #[test]
    fn stale_beyond_max_age_is_rejected() {
        assert!(!is_within_age_bounds(ts(0), ts(400), 300));
    }

    #[test]
    fn within_max_age_is_accepted() {
        assert!(is_within_age_bounds(ts(100), ts(300), 300));
    }

    #[test]
    fn future_within_skew_grace_is_accepted() {
        assert!(is_within_age_bounds(ts(160), ts(100), 300));
    }

    #[test]
    fn future_beyond_skew_grace_is_rejected() {
        assert!(!is_within_age_bounds(ts(200), ts(100), 300));
    }
}
