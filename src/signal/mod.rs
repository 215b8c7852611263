// =============================================================================
// Signal formatter & emitter
// =============================================================================

pub mod emitter;
pub mod sink;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::evaluator::{EntryMode, SignalContext, Transition};
use crate::model::{MetricsSnapshot, Plan, PlanLifecycleState, PlanRuntimeState};

/// Protocol version stamped on every emitted signal.
pub const PROTOCOL_VERSION: &str = "breakout-v1";

/// Runtime timestamps/substate carried on every signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeFields {
    pub armed_at: Option<DateTime<Utc>>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub break_ts: Option<DateTime<Utc>>,
    pub substate: String,
    pub invalid_reason: Option<String>,
}

/// Metrics subset carried on every signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalMetrics {
    pub rvol: Option<f64>,
    pub natr_pct: Option<f64>,
    pub atr: Option<f64>,
    pub pinbar: bool,
    pub pinbar_type: Option<String>,
    pub ob_sweep_detected: bool,
    pub ob_sweep_side: Option<String>,
    pub ob_imbalance_long: Option<f64>,
    pub ob_imbalance_short: Option<f64>,
}

/// A contract-compliant signal record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    pub plan_id: String,
    pub state: String,
    pub protocol_version: String,
    pub runtime: RuntimeFields,
    pub timestamp: DateTime<Utc>,
    pub last_price: f64,
    pub metrics: SignalMetrics,
    pub strength_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_mode: Option<String>,
}

impl SignalRecord {
    /// The `(plan_id, state, timestamp)` tuple identifying this emission
    ///.
    pub fn dedup_key(&self) -> (String, String, DateTime<Utc>) {
        (self.plan_id.clone(), self.state.clone(), self.timestamp)
    }

    /// A 16-hex-char hash over the dedup key, used as a compact idempotency
    /// token for persistence and logging.
    pub fn idempotency_hash(&self) -> String {
        idempotency_hash(&self.plan_id, &self.state, self.timestamp)
    }
}

/// Hash `(plan_id, state, timestamp)` into the 16-char idempotency token.
pub fn idempotency_hash(plan_id: &str, state: &str, timestamp: DateTime<Utc>) -> String {
    let key = format!("{plan_id}:{state}:{}", timestamp.to_rfc3339());
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(digest)[..16].to_string()
}

fn lifecycle_state_label(state: PlanLifecycleState) -> &'static str {
    match state {
        PlanLifecycleState::Triggered => "triggered",
        PlanLifecycleState::Invalid => "invalid",
        PlanLifecycleState::Expired => "expired",
        PlanLifecycleState::Pending => "pending",
        PlanLifecycleState::Armed => "armed",
    }
}

/// Strength score for a triggered signal. Invalid/expired
/// emissions score the base value only.
pub fn strength_score(new_state: PlanLifecycleState, metrics: &MetricsSnapshot) -> f64 {
    let base = 30.0;
    if new_state != PlanLifecycleState::Triggered {
        return base;
    }
    let mut score = base;
    if let Some(rvol) = metrics.rvol {
        score += 25.0 * ((rvol - 1.0) / 2.0).clamp(0.0, 1.0);
    }
    if let Some(natr) = metrics.natr_pct {
        if (0.5..=5.0).contains(&natr) {
            score += 25.0;
        }
    }
    if metrics.pinbar != crate::model::Pinbar::None {
        score += 10.0;
    }
    if metrics.ob_sweep_detected {
        score += 10.0;
    }
    (score * 10.0).round() / 10.0
}

/// Build a contract-compliant signal record from a runtime, plan, the
/// transition just applied, and the metrics snapshot that produced it.
pub fn format_signal(
    plan: &Plan,
    runtime_after: &PlanRuntimeState,
    transition: &Transition,
    metrics: &MetricsSnapshot,
    last_price: f64,
) -> SignalRecord {
    let entry_mode = transition
        .signal_context
        .as_ref()
        .and_then(|ctx: &SignalContext| ctx.entry_mode)
        .map(|mode| match mode {
            EntryMode::Momentum => "momentum".to_string(),
            EntryMode::Retest => "retest".to_string(),
        });

    let state_label = lifecycle_state_label(runtime_after.state).to_string();

    SignalRecord {
        plan_id: plan.id.clone(),
        state: state_label,
        protocol_version: PROTOCOL_VERSION.to_string(),
        runtime: RuntimeFields {
            armed_at: runtime_after.armed_at,
            triggered_at: runtime_after.triggered_at,
            break_ts: runtime_after.break_ts,
            substate: format!("{:?}", runtime_after.substate),
            invalid_reason: runtime_after.invalid_reason.map(|r| format!("{r:?}")),
        },
        timestamp: transition.timestamp,
        last_price,
        metrics: SignalMetrics {
            rvol: metrics.rvol,
            natr_pct: metrics.natr_pct,
            atr: metrics.atr,
            pinbar: metrics.pinbar != crate::model::Pinbar::None,
            pinbar_type: match metrics.pinbar {
                crate::model::Pinbar::None => None,
                crate::model::Pinbar::Bullish => Some("bullish".to_string()),
                crate::model::Pinbar::Bearish => Some("bearish".to_string()),
            },
            ob_sweep_detected: metrics.ob_sweep_detected,
            ob_sweep_side: match metrics.ob_sweep_side {
                crate::model::SweepSide::None => None,
                crate::model::SweepSide::Bid => Some("bid".to_string()),
                crate::model::SweepSide::Ask => Some("ask".to_string()),
            },
            ob_imbalance_long: metrics.ob_imbalance_long,
            ob_imbalance_short: metrics.ob_imbalance_short,
        },
        strength_score: strength_score(runtime_after.state, metrics),
        entry_mode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Transition;
    use crate::model::{BreakoutSubState, Direction, InvalidationReason, Pinbar, PlanExtra, SweepSide};
    use chrono::TimeZone;

    fn ts(s: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(s, 0).unwrap()
    }

    fn plan() -> Plan {
        Plan {
            id: "btc_long".into(),
            instrument_id: "BTC-USD".into(),
            direction: Direction::Long,
            entry_price: 45000.0,
            entry_type: "breakout".into(),
            created_at: ts(0),
            stop_loss: None,
            target_price: None,
            extra: PlanExtra::default(),
        }
    }

    fn metrics(rvol: f64, natr: f64, pinbar: Pinbar, sweep: bool) -> MetricsSnapshot {
        MetricsSnapshot {
            ts: ts(180),
            atr: Some(50.0),
            natr_pct: Some(natr),
            rvol: Some(rvol),
            pinbar,
            ob_sweep_detected: sweep,
            ob_sweep_side: if sweep { SweepSide::Ask } else { SweepSide::None },
            ob_imbalance_long: None,
            ob_imbalance_short: None,
        }
    }

    #[test]
    fn idempotency_hash_is_16_hex_chars() {
        let h = idempotency_hash("p1", "triggered", ts(10));
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn same_key_produces_same_hash() {
        let a = idempotency_hash("p1", "triggered", ts(10));
        let b = idempotency_hash("p1", "triggered", ts(10));
        assert_eq!(a, b);
    }

    #[test]
    fn strength_score_base_for_non_triggered() {
        let m = metrics(2.0, 1.0, Pinbar::Bullish, true);
        assert_eq!(strength_score(PlanLifecycleState::Invalid, &m), 30.0);
    }

    #[test]
    fn strength_score_accumulates_and_clips_at_100() {
        let m = metrics(5.0, 1.0, Pinbar::Bullish, true);
        let score = strength_score(PlanLifecycleState::Triggered, &m);
        assert!((55.0..=100.0).contains(&score));
    }

    #[test]
    fn format_signal_carries_entry_mode_for_momentum() {
        let p = plan();
        let runtime = PlanRuntimeState::new()
            .with_break_seen(ts(60))
            .with_state(PlanLifecycleState::Triggered, BreakoutSubState::None, ts(180), None);
        let transition = Transition {
            new_state: PlanLifecycleState::Triggered,
            new_substate: BreakoutSubState::None,
            timestamp: ts(180),
            emit_signal: true,
            invalid_reason: None,
            signal_context: Some(SignalContext { entry_mode: Some(EntryMode::Momentum) }),
            mark_break_seen: false,
            mark_break_confirmed: true,
        };
        let m = metrics(2.0, 1.0, Pinbar::None, true);
        let signal = format_signal(&p, &runtime, &transition, &m, 45020.0);
        assert_eq!(signal.state, "triggered");
        assert_eq!(signal.entry_mode, Some("momentum".to_string()));
        assert_eq!(signal.protocol_version, PROTOCOL_VERSION);
    }

    #[test]
    fn format_signal_has_no_entry_mode_for_invalidation() {
        let p = plan();
        let runtime = PlanRuntimeState::new().with_state(PlanLifecycleState::Invalid, BreakoutSubState::None, ts(10), Some(InvalidationReason::PriceAbove));
        let transition = Transition {
            new_state: PlanLifecycleState::Invalid,
            new_substate: BreakoutSubState::None,
            timestamp: ts(10),
            emit_signal: true,
            invalid_reason: Some(InvalidationReason::PriceAbove),
            signal_context: None,
            mark_break_seen: false,
            mark_break_confirmed: false,
        };
        let m = metrics(1.0, 1.0, Pinbar::None, false);
        let signal = format_signal(&p, &runtime, &transition, &m, 46500.0);
        assert_eq!(signal.state, "invalid");
        assert!(signal.entry_mode.is_none());
    }
}
