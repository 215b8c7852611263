// =============================================================================
// Candle — immutable OHLCV bar
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DataQualityKind;

/// A single OHLCV candlestick carrying the bar's market time.
///
/// `ts` is the market time the core treats as authoritative for all
/// downstream decisions; wall-clock time never substitutes for it except
/// as an explicit, logged fallback (see [`crate::time`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub is_closed: bool,
}

impl Candle {
    /// Construct a candle, validating the OHLC/volume invariants.
    ///
    /// Rejects non-finite or non-positive prices, negative volume, and any
    /// `low <= min(open,close) <= max(open,close) <= high` violation.
    pub fn new(
        ts: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        is_closed: bool,
    ) -> Result<Self, DataQualityKind> {
        for price in [open, high, low, close] {
            if !price.is_finite() || price <= 0.0 {
                return Err(DataQualityKind::Malformed);
            }
        }
        if !volume.is_finite() || volume < 0.0 {
            return Err(DataQualityKind::Malformed);
        }
        let lo = open.min(close);
        let hi = open.max(close);
        if low > lo || hi > high {
            return Err(DataQualityKind::Malformed);
        }
        Ok(Self {
            ts,
            open,
            high,
            low,
            close,
            volume,
            is_closed,
        })
    }

    /// High minus low — the bar's raw range.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// True Range of this candle against a previous close. For the first
    /// candle in a series (no previous close) the caller passes `None` and
    /// gets back `high - low`.
    pub fn true_range(&self, prev_close: Option<f64>) -> f64 {
        match prev_close {
            None => self.range(),
            Some(prev_close) => {
                let hl = self.high - self.low;
                let hc = (self.high - prev_close).abs();
                let lc = (self.low - prev_close).abs();
                hl.max(hc).max(lc)
            }
        }
    }
}
