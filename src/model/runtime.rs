// =============================================================================
// PlanRuntimeState — per-plan lifecycle record with monotone flag updates
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level lifecycle state of a plan. `Triggered`, `Invalid`, and `Expired`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanLifecycleState {
    Pending,
    Armed,
    Triggered,
    Invalid,
    Expired,
}

impl PlanLifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PlanLifecycleState::Triggered | PlanLifecycleState::Invalid | PlanLifecycleState::Expired
        )
    }
}

/// Internal breakout-specific substate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakoutSubState {
    None,
    BreakSeen,
    BreakConfirmed,
    RetestArmed,
    RetestTriggered,
}

/// Why a plan was invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationReason {
    PriceAbove,
    PriceBelow,
    StopLoss,
    FakeoutClose,
    TimeLimit,
}

/// Per-plan lifecycle record. Once a monotone flag (`break_seen`,
/// `break_confirmed`, `signal_emitted`) is set it can never clear again; the
/// builders below enforce this by construction — there is no public setter
/// that can unset a flag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanRuntimeState {
    pub state: PlanLifecycleState,
    pub substate: BreakoutSubState,
    pub break_ts: Option<DateTime<Utc>>,
    pub armed_at: Option<DateTime<Utc>>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub invalid_reason: Option<InvalidationReason>,
    pub break_seen: bool,
    pub break_confirmed: bool,
    pub signal_emitted: bool,
}

impl PlanRuntimeState {
    /// A freshly created runtime record for a plan seen for the first time.
    pub fn new() -> Self {
        Self {
            state: PlanLifecycleState::Pending,
            substate: BreakoutSubState::None,
            break_ts: None,
            armed_at: None,
            triggered_at: None,
            invalid_reason: None,
            break_seen: false,
            break_confirmed: false,
            signal_emitted: false,
        }
    }

    /// Mark the raw break as seen; transitions to `Pending/BreakSeen`.
    /// `break_seen` can only ever go from false to true.
    pub fn with_break_seen(&self, timestamp: DateTime<Utc>) -> Self {
        Self {
            substate: BreakoutSubState::BreakSeen,
            break_ts: Some(timestamp),
            break_seen: true,
            ..*self
        }
    }

    /// Mark the break as confirmed; transitions to `Armed/BreakConfirmed`
    /// and stamps `armed_at`.
    pub fn with_break_confirmed(&self, timestamp: DateTime<Utc>) -> Self {
        Self {
            state: PlanLifecycleState::Armed,
            substate: BreakoutSubState::BreakConfirmed,
            armed_at: Some(timestamp),
            break_confirmed: true,
            ..*self
        }
    }

    /// General state transition builder. Stamps `armed_at` / `triggered_at`
    /// only when entering those respective states, so those timestamps are
    /// set exactly once, on entry.
    pub fn with_state(
        &self,
        new_state: PlanLifecycleState,
        substate: BreakoutSubState,
        timestamp: DateTime<Utc>,
        invalid_reason: Option<InvalidationReason>,
    ) -> Self {
        let mut next = Self {
            state: new_state,
            substate,
            invalid_reason,
            ..*self
        };
        match new_state {
            PlanLifecycleState::Armed => next.armed_at = Some(timestamp),
            PlanLifecycleState::Triggered => next.triggered_at = Some(timestamp),
            _ => {}
        }
        next
    }

    /// Mark the idempotency flag; never clears once set.
    pub fn with_signal_emitted(&self) -> Self {
        Self {
            signal_emitted: true,
            ..*self
        }
    }
}

impl Default for PlanRuntimeState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(s: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(s, 0).unwrap()
    }

    #[test]
    fn new_runtime_starts_pending_none() {
        let rt = PlanRuntimeState::new();
        assert_eq!(rt.state, PlanLifecycleState::Pending);
        assert_eq!(rt.substate, BreakoutSubState::None);
        assert!(!rt.break_seen);
        assert!(!rt.signal_emitted);
    }

    #[test]
    fn break_seen_flag_is_monotone() {
        let rt = PlanRuntimeState::new().with_break_seen(ts(10));
        assert!(rt.break_seen);
        assert_eq!(rt.break_ts, Some(ts(10)));
        // A later call cannot un-set it, only re-affirm/advance it.
        let rt2 = rt.with_break_confirmed(ts(20));
        assert!(rt2.break_seen);
        assert!(rt2.break_confirmed);
    }

    #[test]
    fn armed_at_set_only_on_armed_entry() {
        let rt = PlanRuntimeState::new();
        let rt = rt.with_state(PlanLifecycleState::Pending, BreakoutSubState::BreakSeen, ts(5), None);
        assert_eq!(rt.armed_at, None);
        let rt = rt.with_state(PlanLifecycleState::Armed, BreakoutSubState::RetestArmed, ts(15), None);
        assert_eq!(rt.armed_at, Some(ts(15)));
    }

    #[test]
    fn triggered_at_set_only_on_triggered_entry() {
        let rt = PlanRuntimeState::new();
        let rt = rt.with_state(PlanLifecycleState::Triggered, BreakoutSubState::None, ts(30), None);
        assert_eq!(rt.triggered_at, Some(ts(30)));
    }

    #[test]
    fn terminal_states_are_flagged() {
        assert!(PlanLifecycleState::Triggered.is_terminal());
        assert!(PlanLifecycleState::Invalid.is_terminal());
        assert!(PlanLifecycleState::Expired.is_terminal());
        assert!(!PlanLifecycleState::Pending.is_terminal());
        assert!(!PlanLifecycleState::Armed.is_terminal());
    }

    #[test]
    fn signal_emitted_is_sticky() {
        let rt = PlanRuntimeState::new().with_signal_emitted();
        assert!(rt.signal_emitted);
        let rt2 = rt.with_break_seen(ts(1));
        assert!(rt2.signal_emitted);
    }
}
