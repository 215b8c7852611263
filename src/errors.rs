// =============================================================================
// Error taxonomy — two orthogonal axes
// =============================================================================
//
// Data-quality errors are recoverable: the caller records them and continues
// with whatever prior state exists. System faults are unrecoverable for the
// current unit of work (a plan, a tick) but never corrupt state — they abort
// just that plan/tick and are logged.

use thiserror::Error;

/// Recoverable data-quality issue encountered during ingest or normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DataQualityKind {
    #[error("malformed data")]
    Malformed,
    #[error("stale, out-of-order, or future-dated beyond skew grace")]
    Temporal,
    #[error("required field missing but processing can continue")]
    Partial,
    #[error("nothing to process")]
    Missing,
    #[error("insufficient history for calculation")]
    InsufficientHistory,
    #[error("one-tick outlier rejected by spike filter")]
    SpikeFiltered,
}

/// Unrecoverable-for-this-unit-of-work system fault. Logged and skipped;
/// never corrupts the plan's or instrument's prior state.
#[derive(Debug, Clone, Error)]
pub enum SystemFault {
    #[error("metrics calculation produced a nonsensical value: {0}")]
    Metrics(String),
    #[error("illegal state transition attempted: {0}")]
    StateTransition(String),
    #[error("persistence operation failed: {0}")]
    Persistence(String),
    #[error("signal delivery exhausted retries: {0}")]
    Delivery(String),
}

/// Failure returned when a plan fails admission validation.
#[derive(Debug, Clone, Error)]
pub enum PlanAdmissionError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("unsupported entry_type: {0} (only \"breakout\" is accepted)")]
    UnsupportedEntryType(String),
    #[error("entry_price must be a positive finite number, got {0}")]
    InvalidEntryPrice(f64),
    #[error("parameter override out of legal range: {field} = {value}")]
    ParamOutOfRange { field: &'static str, value: f64 },
    #[error("malformed invalidation condition: {0}")]
    MalformedInvalidationCondition(String),
}
