// =============================================================================
// Plan — operator-supplied breakout plan input
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trade direction for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn is_short(self) -> bool {
        matches!(self, Direction::Short)
    }
}

/// A single pre-trigger invalidation condition, parsed once at plan
/// admission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvalidationCondition {
    PriceAbove { level: f64 },
    PriceBelow { level: f64 },
    TimeLimit { duration_seconds: i64 },
}

/// Breakout confirmation parameters.
///
/// Immutable once merged; a fresh copy is produced by [`crate::config`] per
/// plan by overlaying plan overrides onto instrument overrides onto these
/// defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakoutParameters {
    pub penetration_pct: f64,
    pub penetration_natr_mult: f64,
    pub min_rvol: f64,
    pub confirm_close: bool,
    pub confirm_time_ms: i64,
    pub allow_retest_entry: bool,
    pub retest_band_pct: f64,
    pub fakeout_close_invalidate: bool,
    pub ob_sweep_check: bool,
    pub min_break_range_atr: f64,
}

impl Default for BreakoutParameters {
    fn default() -> Self {
        Self {
            penetration_pct: 0.05,
            penetration_natr_mult: 0.25,
            min_rvol: 1.5,
            confirm_close: true,
            confirm_time_ms: 750,
            allow_retest_entry: false,
            retest_band_pct: 0.03,
            fakeout_close_invalidate: true,
            ob_sweep_check: true,
            min_break_range_atr: 0.5,
        }
    }
}

/// Non-exhaustive per-plan overrides. Any field left `None` falls through to
/// the instrument-level or global default.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BreakoutParamOverrides {
    pub penetration_pct: Option<f64>,
    pub penetration_natr_mult: Option<f64>,
    pub min_rvol: Option<f64>,
    pub confirm_close: Option<bool>,
    pub confirm_time_ms: Option<i64>,
    pub allow_retest_entry: Option<bool>,
    pub retest_band_pct: Option<f64>,
    pub fakeout_close_invalidate: Option<bool>,
    pub ob_sweep_check: Option<bool>,
    pub min_break_range_atr: Option<f64>,
}

impl BreakoutParamOverrides {
    /// Apply this set of overrides on top of `base`, field by field.
    pub fn apply(&self, base: BreakoutParameters) -> BreakoutParameters {
        BreakoutParameters {
            penetration_pct: self.penetration_pct.unwrap_or(base.penetration_pct),
            penetration_natr_mult: self.penetration_natr_mult.unwrap_or(base.penetration_natr_mult),
            min_rvol: self.min_rvol.unwrap_or(base.min_rvol),
            confirm_close: self.confirm_close.unwrap_or(base.confirm_close),
            confirm_time_ms: self.confirm_time_ms.unwrap_or(base.confirm_time_ms),
            allow_retest_entry: self.allow_retest_entry.unwrap_or(base.allow_retest_entry),
            retest_band_pct: self.retest_band_pct.unwrap_or(base.retest_band_pct),
            fakeout_close_invalidate: self
                .fakeout_close_invalidate
                .unwrap_or(base.fakeout_close_invalidate),
            ob_sweep_check: self.ob_sweep_check.unwrap_or(base.ob_sweep_check),
            min_break_range_atr: self.min_break_range_atr.unwrap_or(base.min_break_range_atr),
        }
    }
}

/// Operator-supplied extra fields on a plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanExtra {
    #[serde(default)]
    pub breakout_params: BreakoutParamOverrides,
    #[serde(default)]
    pub invalidation_conditions: Vec<InvalidationCondition>,
}

/// A breakout plan as supplied by the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub instrument_id: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub entry_type: String,
    pub created_at: DateTime<Utc>,
    pub stop_loss: Option<f64>,
    pub target_price: Option<f64>,
    #[serde(default)]
    pub extra: PlanExtra,
}

impl Plan {
    pub fn is_breakout_entry(&self) -> bool {
        self.entry_type == "breakout"
    }
}

/// Validate that every invalidation condition on a plan is well-formed:
/// price levels finite and positive, durations non-negative. Returns the
/// first violation found.
pub fn validate_invalidation_conditions(
    conditions: &[InvalidationCondition],
) -> Result<(), crate::errors::PlanAdmissionError> {
    use crate::errors::PlanAdmissionError as E;

    for condition in conditions {
        let violation = match condition {
            InvalidationCondition::PriceAbove { level } | InvalidationCondition::PriceBelow { level } => {
                (!level.is_finite() || *level <= 0.0).then(|| format!("{condition:?}: level must be a positive finite number"))
            }
            InvalidationCondition::TimeLimit { duration_seconds } => {
                (*duration_seconds < 0).then(|| format!("{condition:?}: duration_seconds must be non-negative"))
            }
        };
        if let Some(reason) = violation {
            return Err(E::MalformedInvalidationCondition(reason));
        }
    }
    Ok(())
}
