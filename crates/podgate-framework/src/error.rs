//! Framework error types.

use thiserror::Error;

/// Result type alias for framework operations.
pub type FrameworkResult<T> = Result<T, FrameworkError>;

/// Errors raised outside of stage execution: plugin construction, registry
/// bookkeeping, and cycle state access.
#[derive(Debug, Error)]
pub enum FrameworkError {
    #[error("plugin not registered: {0}")]
    UnknownPlugin(String),

    #[error("plugin already registered: {0}")]
    DuplicatePlugin(String),

    #[error("required service unavailable: {0}")]
    MissingService(&'static str),

    #[error("invalid plugin args for {plugin}: {reason}")]
    InvalidArgs { plugin: String, reason: String },

    #[error("invalid score range: min {min} must be below max {max}")]
    InvalidScoreRange { min: i64, max: i64 },

    #[error("cycle state key not found: {0}")]
    StateNotFound(&'static str),

    #[error("cycle state key {0} holds a value of another type")]
    StateTypeMismatch(&'static str),
}
