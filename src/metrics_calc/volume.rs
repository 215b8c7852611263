// =============================================================================
// RVOL — relative volume
// =============================================================================

/// `current_volume / mean(history)`. Undefined if history has fewer than
/// `period` samples or the mean is zero.
pub fn rvol(current_volume: f64, history: &[f64], period: usize) -> Option<f64> {
    if history.len() < period || period == 0 {
        return None;
    }
    let window = &history[history.len() - period..];
    let mean: f64 = window.iter().sum::<f64>() / period as f64;
    if mean == 0.0 {
        None
    } else {
        Some(current_volume / mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_below_period() {
        assert_eq!(rvol(10.0, &[1.0, 2.0], 3), None);
    }

    #[test]
    fn none_on_zero_mean() {
        assert_eq!(rvol(10.0, &[0.0, 0.0, 0.0], 3), None);
    }

    #[test]
    fn computes_ratio_against_mean() {
        assert_eq!(rvol(20.0, &[10.0, 10.0, 10.0], 3), Some(2.0));
    }
}
