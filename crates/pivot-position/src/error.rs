//! Error types for pivot-position.

use thiserror::Error;

/// Position lifecycle errors.
#[derive(Debug, Error)]
pub enum PositionError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid fill: {0}")]
    InvalidFill(String),
}

/// Result type alias for position operations.
pub type PositionResult<T> = std::result::Result<T, PositionError>;
