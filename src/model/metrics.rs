// =============================================================================
// MetricsSnapshot — immutable per-tick derived metrics
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pinbar classification for a single candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pinbar {
    None,
    Bullish,
    Bearish,
}

/// Which side of the book a detected sweep attacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepSide {
    None,
    Bid,
    Ask,
}

/// Immutable snapshot of derived metrics for one instrument at one tick.
///
/// A snapshot is "sufficient" iff `atr`, `natr_pct`, and `rvol` are all
/// present; gates that require one of them must fail closed when
/// it is absent rather than treat `None` as passing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub ts: DateTime<Utc>,
    pub atr: Option<f64>,
    pub natr_pct: Option<f64>,
    pub rvol: Option<f64>,
    pub pinbar: Pinbar,
    pub ob_sweep_detected: bool,
    pub ob_sweep_side: SweepSide,
    pub ob_imbalance_long: Option<f64>,
    pub ob_imbalance_short: Option<f64>,
}

impl MetricsSnapshot {
    pub fn is_sufficient(&self) -> bool {
        self.atr.is_some() && self.natr_pct.is_some() && self.rvol.is_some()
    }

    /// All calculated values considered sane.
    /// Returns the first field name that is out of bounds, if any.
    pub fn fault(&self) -> Option<&'static str> {
        if let Some(atr) = self.atr {
            if !atr.is_finite() || atr < 0.0 || atr > 1e6 {
                return Some("atr");
            }
        }
        if let Some(natr) = self.natr_pct {
            if !natr.is_finite() || natr < 0.0 || natr > 100.0 {
                return Some("natr_pct");
            }
        }
        if let Some(rvol) = self.rvol {
            if !rvol.is_finite() || rvol < 0.0 || rvol > 1000.0 {
                return Some("rvol");
            }
        }
        for (name, imb) in [
            ("ob_imbalance_long", self.ob_imbalance_long),
            ("ob_imbalance_short", self.ob_imbalance_short),
        ] {
            if let Some(v) = imb {
                if v.is_nan() || v < 0.0 || v > 1000.0 {
                    return Some(name);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base() -> MetricsSnapshot {
        MetricsSnapshot {
            ts: Utc.timestamp_opt(0, 0).unwrap(),
            atr: Some(1.0),
            natr_pct: Some(1.0),
            rvol: Some(1.0),
            pinbar: Pinbar::None,
            ob_sweep_detected: false,
            ob_sweep_side: SweepSide::None,
            ob_imbalance_long: None,
            ob_imbalance_short: None,
        }
    }

    #[test]
    fn sufficient_requires_all_three() {
        let mut m = base();
        assert!(m.is_sufficient());
        m.rvol = None;
        assert!(!m.is_sufficient());
    }

    #[test]
    fn fault_flags_absurd_atr() {
        let mut m = base();
        m.atr = Some(2e6);
        assert_eq!(m.fault(), Some("atr"));
    }

    #[test]
    fn fault_flags_absurd_rvol() {
        let mut m = base();
        m.rvol = Some(1001.0);
        assert_eq!(m.fault(), Some("rvol"));
    }

    #[test]
    fn no_fault_on_sane_values() {
        assert_eq!(base().fault(), None);
    }
}
