// =============================================================================
// ATR / NATR — simple mean of True Range over the trailing window
// =============================================================================
//
// Deliberately NOT Wilder's smoothing: this is the arithmetic mean of the
// last `period` true ranges, recomputed fresh each call.

use crate::model::Candle;

/// Average True Range over the last `period` closed bars, oldest-first in
/// `bars`. Returns `None` if fewer than `period` bars are available.
pub fn atr(bars: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }
    let window = &bars[bars.len() - period..];
    let mut sum = 0.0;
    for (i, candle) in window.iter().enumerate() {
        let prev_close = if i == 0 {
            // prev_close comes from the bar immediately preceding the window,
            // if one exists in the fuller series.
            let window_start = bars.len() - period;
            if window_start > 0 {
                Some(bars[window_start - 1].close)
            } else {
                None
            }
        } else {
            Some(window[i - 1].close)
        };
        sum += candle.true_range(prev_close);
    }
    Some(sum / period as f64)
}

/// Normalized ATR as a percentage of the current close.
pub fn natr_pct(atr_value: Option<f64>, close: f64) -> Option<f64> {
    match atr_value {
        Some(a) if close > 0.0 => Some(100.0 * a / close),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(s: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(s, 0).unwrap()
    }

    fn candle(ts_val: i64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new(ts(ts_val), close, high, low, close, 10.0, true).unwrap()
    }

    #[test]
    fn none_below_period() {
        let bars = vec![candle(0, 105.0, 95.0, 100.0)];
        assert_eq!(atr(&bars, 14), None);
    }

    #[test]
    fn simple_mean_of_true_ranges() {
        let bars = vec![
            candle(0, 105.0, 95.0, 100.0),
            candle(60, 106.0, 96.0, 101.0),
            candle(120, 107.0, 97.0, 102.0),
        ];
        // TR0 (no prev) = 10; TR1 = max(10, |106-100|, |96-100|) = 10; TR2 = max(10, 6, 4)=10
        assert_eq!(atr(&bars, 3), Some(10.0));
    }

    #[test]
    fn natr_requires_atr_and_positive_close() {
        assert_eq!(natr_pct(Some(2.0), 100.0), Some(2.0));
        assert_eq!(natr_pct(Some(2.0), 0.0), None);
        assert_eq!(natr_pct(None, 100.0), None);
    }
}
