//! Error types for pivot-flow.

use thiserror::Error;

/// Flow engine errors.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for flow operations.
pub type FlowResult<T> = std::result::Result<T, FlowError>;
