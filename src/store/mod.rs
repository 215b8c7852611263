// =============================================================================
// Per-instrument store
// =============================================================================

pub mod instrument;
pub mod ring;

pub use instrument::{InstrumentStore, DEFAULT_BARS_WINDOW, DEFAULT_VOLUME_WINDOW};
pub use ring::Ring;
