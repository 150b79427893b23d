//! Shared utilities.

/// Wall-clock abstraction and helpers.
pub mod clock;
/// Structured logging setup.
pub mod telemetry;

pub use clock::*;
pub use telemetry::*;
