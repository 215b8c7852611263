// =============================================================================
// Candle structure / pinbar detection
// =============================================================================

use crate::model::{Candle, Pinbar};

/// Classify a candle as a bullish/bearish pinbar, or none.
///
/// Zero-range candles are never pinbars — the ratio thresholds below would
/// otherwise divide degenerate (all-equal) shadows by zero range.
pub fn detect_pinbar(candle: &Candle) -> Pinbar {
    let range = candle.range();
    if range <= 0.0 {
        return Pinbar::None;
    }
    let body = (candle.close - candle.open).abs();
    let upper = candle.high - candle.open.max(candle.close);
    let lower = candle.open.min(candle.close) - candle.low;

    if body > 0.4 * range {
        return Pinbar::None;
    }
    if lower >= 0.66 * range && upper <= 0.1 * range {
        Pinbar::Bullish
    } else if upper >= 0.66 * range && lower <= 0.1 * range {
        Pinbar::Bearish
    } else {
        Pinbar::None
    }
}
