//! Error definitions for the mapping module

use crate::output::OutputError;
use thiserror::Error;

/// Errors raised while turning one input event into output.
///
/// All of them are contained to the mapping that raised them; the dispatch
/// loop logs and moves on.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Unrecognized mode or a mode/input combination that cannot produce
    /// output. The mapping stays inert.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Speed bounds are inverted
    #[error("Speed range error: min speed {min_speed} exceeds max speed {max_speed}")]
    RangeError { min_speed: f64, max_speed: f64 },

    /// The wiggle worker could not be spawned or joined
    #[error("Resource error: {0}")]
    ResourceError(String),

    #[error("Output error: {0}")]
    OutputError(#[from] OutputError),
}
