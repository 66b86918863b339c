//! Runtime error types.

use thiserror::Error;

use podgate_framework::{ClientError, FrameworkError};

/// Errors that can occur while setting up or driving the scheduler.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("framework error: {0}")]
    Framework(#[from] FrameworkError),

    #[error("cluster error: {0}")]
    Client(#[from] ClientError),

    #[error("pod already submitted: {0}")]
    DuplicatePod(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
