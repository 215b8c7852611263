// =============================================================================
// Transition applier & idempotency legality
// =============================================================================

use crate::errors::SystemFault;
use crate::model::{BreakoutSubState, PlanLifecycleState, PlanRuntimeState};

use super::Transition;

/// Validate and apply `transition` on top of `runtime`, returning the new
/// runtime state. Illegal transitions leave `runtime` conceptually untouched
/// — the caller must discard the `Err` and keep using the prior state.
pub fn apply(runtime: &PlanRuntimeState, transition: &Transition) -> Result<PlanRuntimeState, SystemFault> {
    validate_legality(runtime, transition)?;

    let mut next = runtime.with_state(
        transition.new_state,
        transition.new_substate,
        transition.timestamp,
        transition.invalid_reason,
    );

    if transition.mark_break_seen {
        next = next.with_break_seen(transition.timestamp);
    }
    if transition.mark_break_confirmed && !next.break_confirmed {
        next = PlanRuntimeState { break_confirmed: true, ..next };
    }
    if transition.emit_signal {
        next = next.with_signal_emitted();
    }

    Ok(next)
}

fn validate_legality(runtime: &PlanRuntimeState, transition: &Transition) -> Result<(), SystemFault> {
    if runtime.state.is_terminal() {
        return Err(SystemFault::StateTransition(format!(
            "no transitions are legal out of terminal state {:?}",
            runtime.state
        )));
    }
    if runtime.state == PlanLifecycleState::Triggered
        && matches!(transition.new_state, PlanLifecycleState::Pending | PlanLifecycleState::Armed)
    {
        return Err(SystemFault::StateTransition(
            "no edge from Triggered back to Pending or Armed".into(),
        ));
    }
    match transition.new_state {
        PlanLifecycleState::Pending
            if !matches!(transition.new_substate, BreakoutSubState::None | BreakoutSubState::BreakSeen) =>
        {
            return Err(SystemFault::StateTransition(format!(
                "substate {:?} is not legal for Pending",
                transition.new_substate
            )));
        }
        PlanLifecycleState::Armed
            if !matches!(
                transition.new_substate,
                BreakoutSubState::BreakConfirmed | BreakoutSubState::RetestArmed
            ) =>
        {
            return Err(SystemFault::StateTransition(format!(
                "substate {:?} is not legal for Armed",
                transition.new_substate
            )));
        }
        _ => {}
    }

    for prior in [runtime.armed_at, runtime.triggered_at, runtime.break_ts].into_iter().flatten() {
        if transition.timestamp < prior {
            return Err(SystemFault::StateTransition(
                "transition timestamp precedes a prior recorded timestamp".into(),
            ));
        }
    }

    Ok(())
}
