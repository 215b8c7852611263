// =============================================================================
// Canonical data model
// =============================================================================
//
// Immutable value types shared across the engine: candles, order book
// snapshots, derived metrics, plan input, and per-plan runtime state.

pub mod book;
pub mod candle;
pub mod metrics;
pub mod plan;
pub mod runtime;

pub use book::{BookLevel, BookSnap};
pub use candle::Candle;
pub use metrics::{MetricsSnapshot, Pinbar, SweepSide};
pub use plan::{
    validate_invalidation_conditions, BreakoutParamOverrides, BreakoutParameters, Direction,
    InvalidationCondition, Plan, PlanExtra,
};
pub use runtime::{BreakoutSubState, InvalidationReason, PlanLifecycleState, PlanRuntimeState};
