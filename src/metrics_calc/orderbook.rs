// =============================================================================
// Order book imbalance & liquidity sweep detection
// =============================================================================

use crate::model::{BookSnap, SweepSide};

/// Notional-based long/short imbalance ratios over the top `max_levels`.
/// `+inf` when the opposing side is empty and this side is not.
pub struct Imbalance {
    pub long: Option<f64>,
    pub short: Option<f64>,
}

pub fn imbalance(book: &BookSnap, max_levels: usize) -> Imbalance {
    let notional_bids = BookSnap::notional(&book.bids, max_levels);
    let notional_asks = BookSnap::notional(&book.asks, max_levels);

    let long = if notional_asks > 0.0 {
        Some(notional_bids / notional_asks)
    } else if notional_bids > 0.0 {
        Some(f64::INFINITY)
    } else {
        None
    };
    let short = if notional_bids > 0.0 {
        Some(notional_asks / notional_bids)
    } else if notional_asks > 0.0 {
        Some(f64::INFINITY)
    } else {
        None
    };
    Imbalance { long, short }
}

const MIN_ABSOLUTE_DEPLETION: f64 = 1000.0;

/// Detect a liquidity sweep between `prev` and `curr`.
///
/// A side is "swept" if its notional dropped by at least `depletion_threshold`
/// *and* the absolute drop clears `MIN_ABSOLUTE_DEPLETION`, or if the
/// post-state imbalance toward the opposite side clears `imbalance_threshold`.
/// When both sides qualify by depletion, the side with the larger depletion
/// ratio wins.
pub fn detect_sweep(
    prev: &BookSnap,
    curr: &BookSnap,
    max_levels: usize,
    depletion_threshold: f64,
    imbalance_threshold: f64,
) -> (bool, SweepSide) {
    let prev_bids = BookSnap::notional(&prev.bids, max_levels);
    let prev_asks = BookSnap::notional(&prev.asks, max_levels);
    let curr_bids = BookSnap::notional(&curr.bids, max_levels);
    let curr_asks = BookSnap::notional(&curr.asks, max_levels);

    let bid_depletion = if prev_bids > 0.0 {
        let drop = prev_bids - curr_bids;
        let ratio = drop / prev_bids;
        if ratio >= depletion_threshold && drop >= MIN_ABSOLUTE_DEPLETION {
            Some(ratio)
        } else {
            None
        }
    } else {
        None
    };
    let ask_depletion = if prev_asks > 0.0 {
        let drop = prev_asks - curr_asks;
        let ratio = drop / prev_asks;
        if ratio >= depletion_threshold && drop >= MIN_ABSOLUTE_DEPLETION {
            Some(ratio)
        } else {
            None
        }
    } else {
        None
    };

    match (bid_depletion, ask_depletion) {
        (Some(b), Some(a)) => {
            return if b >= a {
                (true, SweepSide::Bid)
            } else {
                (true, SweepSide::Ask)
            };
        }
        (Some(_), None) => return (true, SweepSide::Bid),
        (None, Some(_)) => return (true, SweepSide::Ask),
        (None, None) => {}
    }

    if curr_bids > 0.0 && curr_asks > 0.0 {
        let imb_long = curr_bids / curr_asks;
        let imb_short = curr_asks / curr_bids;
        if imb_long >= imbalance_threshold {
            return (true, SweepSide::Ask);
        }
        if imb_short >= imbalance_threshold {
            return (true, SweepSide::Bid);
        }
    }

    (false, SweepSide::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BookLevel;
    use chrono::{TimeZone, Utc};

    fn ts() -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(0, 0).unwrap()
    }

    fn book(bids: Vec<(f64, f64)>, asks: Vec<(f64, f64)>) -> BookSnap {
        BookSnap::new(
            ts(),
            bids.into_iter().map(|(p, s)| BookLevel::new(p, s).unwrap()).collect(),
            asks.into_iter().map(|(p, s)| BookLevel::new(p, s).unwrap()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn imbalance_is_infinite_when_opposing_side_empty() {
        let b = book(vec![(100.0, 1.0)], vec![]);
        let imb = imbalance(&b, 5);
        assert_eq!(imb.long, Some(f64::INFINITY));
        assert_eq!(imb.short, None);
    }

    #[test]
    fn bid_side_sweep_detected_on_large_depletion() {
        let prev = book(vec![(100.0, 20.0)], vec![(101.0, 20.0)]); // 2000 notional
        let curr = book(vec![(100.0, 1.0)], vec![(101.0, 20.0)]); // 100 notional, drop 1900
        let (swept, side) = detect_sweep(&prev, &curr, 5, 0.2, 1.5);
        assert!(swept);
        assert_eq!(side, SweepSide::Bid);
    }

    #[test]
    fn no_sweep_when_depletion_below_absolute_floor() {
        let prev = book(vec![(100.0, 0.5)], vec![(101.0, 0.5)]); // 50 notional
        let curr = book(vec![(100.0, 0.1)], vec![(101.0, 0.5)]); // drop 40, below floor
        let (swept, _) = detect_sweep(&prev, &curr, 5, 0.2, 1.5);
        assert!(!swept);
    }

    #[test]
    fn picks_larger_depletion_ratio_when_both_qualify() {
        let prev = book(vec![(100.0, 20.0)], vec![(101.0, 20.0)]);
        // bids drop to near zero (ratio ~1.0), asks drop by exactly threshold-ish but smaller ratio
        let curr = book(vec![(100.0, 0.01)], vec![(101.0, 1.0)]);
        let (swept, side) = detect_sweep(&prev, &curr, 5, 0.2, 1.5);
        assert!(swept);
        assert_eq!(side, SweepSide::Bid);
    }

    #[test]
    fn imbalance_fallback_flags_sweep_when_no_depletion_qualifies() {
        let prev = book(vec![(100.0, 1.0)], vec![(101.0, 1.0)]);
        let curr = book(vec![(100.0, 10.0)], vec![(101.0, 1.0)]);
        let (swept, side) = detect_sweep(&prev, &curr, 5, 0.9, 1.5);
        assert!(swept);
        assert_eq!(side, SweepSide::Ask);
    }
}
