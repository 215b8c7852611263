// =============================================================================
// Configuration overlay — global → instrument → plan precedence
// =============================================================================
//
// Serde-defaulted, hot-reloadable structs. The three-tier overlay (global
// defaults, then instrument overrides, then per-plan overrides) is resolved
// fresh on every merge call rather than baked in at load time.

use serde::{Deserialize, Serialize};

use crate::model::{BreakoutParamOverrides, BreakoutParameters};

fn default_atr_period() -> usize {
    14
}
fn default_rvol_period() -> usize {
    20
}
fn default_bars_window() -> usize {
    500
}
fn default_volume_window() -> usize {
    20
}
fn default_spike_enable() -> bool {
    true
}
fn default_spike_atr_multiplier() -> f64 {
    10.0
}
fn default_spike_fallback_pct() -> f64 {
    0.5
}
fn default_max_levels() -> usize {
    5
}
fn default_depletion_threshold() -> f64 {
    0.2
}
fn default_imbalance_threshold() -> f64 {
    1.5
}
fn default_max_age_seconds() -> i64 {
    300
}

/// Global defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    #[serde(rename = "atr.period")]
    pub atr_period: usize,
    #[serde(rename = "volume.rvol_period")]
    pub rvol_period: usize,
    #[serde(rename = "datastore.bars_window_size")]
    pub bars_window_size: usize,
    #[serde(rename = "datastore.volume_window_size")]
    pub volume_window_size: usize,
    #[serde(rename = "spike_filter.enable")]
    pub spike_filter_enable: bool,
    #[serde(rename = "spike_filter.atr_multiplier")]
    pub spike_filter_atr_multiplier: f64,
    pub spike_filter_fallback_pct: f64,
    #[serde(rename = "orderbook.max_levels")]
    pub orderbook_max_levels: usize,
    #[serde(rename = "orderbook.depletion_threshold")]
    pub orderbook_depletion_threshold: f64,
    #[serde(rename = "orderbook.imbalance_threshold")]
    pub orderbook_imbalance_threshold: f64,
    pub max_age_seconds: i64,
    pub breakout: BreakoutParameters,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            atr_period: default_atr_period(),
            rvol_period: default_rvol_period(),
            bars_window_size: default_bars_window(),
            volume_window_size: default_volume_window(),
            spike_filter_enable: default_spike_enable(),
            spike_filter_atr_multiplier: default_spike_atr_multiplier(),
            spike_filter_fallback_pct: default_spike_fallback_pct(),
            orderbook_max_levels: default_max_levels(),
            orderbook_depletion_threshold: default_depletion_threshold(),
            orderbook_imbalance_threshold: default_imbalance_threshold(),
            max_age_seconds: default_max_age_seconds(),
            breakout: BreakoutParameters::default(),
        }
    }
}

/// Per-instrument override subset; `None` fields fall through to global.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstrumentOverrides {
    pub breakout: BreakoutParamOverrides,
}

/// Fully merged, effective configuration for one plan evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EffectiveConfig {
    pub atr_period: usize,
    pub rvol_period: usize,
    pub spike_filter_enable: bool,
    pub spike_filter_atr_multiplier: f64,
    pub spike_filter_fallback_pct: f64,
    pub orderbook_max_levels: usize,
    pub orderbook_depletion_threshold: f64,
    pub orderbook_imbalance_threshold: f64,
    pub max_age_seconds: i64,
    pub breakout: BreakoutParameters,
}

impl GlobalConfig {
    /// Overlay plan-level overrides onto instrument-level overrides onto
    /// these global defaults.
    pub fn merge(
        &self,
        instrument: Option<&InstrumentOverrides>,
        plan: Option<&BreakoutParamOverrides>,
    ) -> EffectiveConfig {
        let mut breakout = self.breakout;
        if let Some(instr) = instrument {
            breakout = instr.breakout.apply(breakout);
        }
        if let Some(plan_overrides) = plan {
            breakout = plan_overrides.apply(breakout);
        }
        EffectiveConfig {
            atr_period: self.atr_period,
            rvol_period: self.rvol_period,
            spike_filter_enable: self.spike_filter_enable,
            spike_filter_atr_multiplier: self.spike_filter_atr_multiplier,
            spike_filter_fallback_pct: self.spike_filter_fallback_pct,
            orderbook_max_levels: self.orderbook_max_levels,
            orderbook_depletion_threshold: self.orderbook_depletion_threshold,
            orderbook_imbalance_threshold: self.orderbook_imbalance_threshold,
            max_age_seconds: self.max_age_seconds,
            breakout,
        }
    }
}

/// Validate a plan's breakout parameter overrides against legal ranges.
/// Returns the first violation found.
pub fn validate_breakout_overrides(
    overrides: &BreakoutParamOverrides,
) -> Result<(), crate::errors::PlanAdmissionError> {
    use crate::errors::PlanAdmissionError as E;

    let checks: &[(&'static str, Option<f64>, fn(f64) -> bool)] = &[
        ("penetration_pct", overrides.penetration_pct, |v| v >= 0.0),
        ("penetration_natr_mult", overrides.penetration_natr_mult, |v| v >= 0.0),
        ("min_rvol", overrides.min_rvol, |v| v >= 0.0),
        ("confirm_time_ms", overrides.confirm_time_ms.map(|v| v as f64), |v| v >= 0.0),
        ("retest_band_pct", overrides.retest_band_pct, |v| v >= 0.0 && v <= 1.0),
        ("min_break_range_atr", overrides.min_break_range_atr, |v| v >= 0.0),
    ];
    for (field, value, is_valid) in checks {
        if let Some(v) = value {
            if !is_valid(*v) {
                return Err(E::ParamOutOfRange { field, value: *v });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_without_overrides_returns_global_defaults() {
        let global = GlobalConfig::default();
        let eff = global.merge(None, None);
        assert_eq!(eff.breakout.min_rvol, 1.5);
    }

    #[test]
    fn plan_override_wins_over_instrument_override() {
        let global = GlobalConfig::default();
        let instr = InstrumentOverrides {
            breakout: BreakoutParamOverrides {
                min_rvol: Some(2.0),
                ..Default::default()
            },
        };
        let plan = BreakoutParamOverrides {
            min_rvol: Some(3.0),
            ..Default::default()
        };
        let eff = global.merge(Some(&instr), Some(&plan));
        assert_eq!(eff.breakout.min_rvol, 3.0);
    }

    #[test]
    fn instrument_override_wins_over_global_when_no_plan_override() {
        let global = GlobalConfig::default();
        let instr = InstrumentOverrides {
            breakout: BreakoutParamOverrides {
                min_rvol: Some(2.0),
                ..Default::default()
            },
        };
        let eff = global.merge(Some(&instr), None);
        assert_eq!(eff.breakout.min_rvol, 2.0);
    }

    #[test]
    fn negative_min_rvol_override_is_rejected() {
        let overrides = BreakoutParamOverrides {
            min_rvol: Some(-1.0),
            ..Default::default()
        };
        assert!(validate_breakout_overrides(&overrides).is_err());
    }

    #[test]
    fn in_range_overrides_are_accepted() {
        let overrides = BreakoutParamOverrides {
            min_rvol: Some(2.5),
            retest_band_pct: Some(0.05),
            ..Default::default()
        };
        assert!(validate_breakout_overrides(&overrides).is_ok());
    }
}
