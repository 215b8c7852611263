// =============================================================================
// Order book snapshot types
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DataQualityKind;

/// A single price/size level on one side of the book. Zero-size levels are
/// dropped at parse time so a constructed `BookLevel` always has
/// `size > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

impl BookLevel {
    pub fn new(price: f64, size: f64) -> Option<Self> {
        if price.is_finite() && price > 0.0 && size.is_finite() && size > 0.0 {
            Some(Self { price, size })
        } else {
            None
        }
    }

    pub fn notional(&self) -> f64 {
        self.price * self.size
    }
}

/// Order book snapshot: bids sorted descending by price, asks ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnap {
    pub ts: DateTime<Utc>,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl BookSnap {
    /// Build a snapshot, validating side ordering and the
    /// `best_bid < best_ask` invariant.
    pub fn new(
        ts: DateTime<Utc>,
        bids: Vec<BookLevel>,
        asks: Vec<BookLevel>,
    ) -> Result<Self, DataQualityKind> {
        if !bids.windows(2).all(|w| w[0].price >= w[1].price) {
            return Err(DataQualityKind::Malformed);
        }
        if !asks.windows(2).all(|w| w[0].price <= w[1].price) {
            return Err(DataQualityKind::Malformed);
        }
        if let (Some(bid), Some(ask)) = (bids.first(), asks.first()) {
            if bid.price >= ask.price {
                return Err(DataQualityKind::Malformed);
            }
        }
        Ok(Self { ts, bids, asks })
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    pub fn mid(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        }
    }

    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Notional (price * size) summed over the top `max_levels` of one side.
    pub fn notional(levels: &[BookLevel], max_levels: usize) -> f64 {
        levels.iter().take(max_levels).map(|l| l.notional()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.timestamp_opt(0, 0).unwrap()
    }

    fn lvl(price: f64, size: f64) -> BookLevel {
        BookLevel::new(price, size).unwrap()
    }

    #[test]
    fn zero_size_level_rejected_at_construction() {
        assert!(BookLevel::new(100.0, 0.0).is_none());
    }

    #[test]
    fn rejects_crossed_book() {
        let bids = vec![lvl(100.0, 1.0)];
        let asks = vec![lvl(99.0, 1.0)];
        assert_eq!(BookSnap::new(ts(), bids, asks).unwrap_err(), DataQualityKind::Malformed);
    }

    #[test]
    fn rejects_misordered_bids() {
        let bids = vec![lvl(99.0, 1.0), lvl(100.0, 1.0)];
        let asks = vec![lvl(101.0, 1.0)];
        assert!(BookSnap::new(ts(), bids, asks).is_err());
    }

    #[test]
    fn mid_and_spread() {
        let book = BookSnap::new(ts(), vec![lvl(100.0, 1.0)], vec![lvl(102.0, 1.0)]).unwrap();
        assert_eq!(book.mid(), Some(101.0));
        assert_eq!(book.spread(), Some(2.0));
    }

    #[test]
    fn empty_side_has_no_mid() {
        let book = BookSnap::new(ts(), vec![], vec![lvl(102.0, 1.0)]).unwrap();
        assert_eq!(book.mid(), None);
    }

    #[test]
    fn notional_caps_at_max_levels() {
        let levels = vec![lvl(100.0, 1.0), lvl(99.0, 1.0), lvl(98.0, 1.0)];
        assert_eq!(BookSnap::notional(&levels, 2), 199.0);
    }
}
