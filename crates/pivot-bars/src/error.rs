//! Error types for pivot-bars.

use thiserror::Error;

/// Bar aggregation errors.
#[derive(Debug, Error)]
pub enum BarsError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),
}

/// Result type alias for bar aggregation operations.
pub type BarsResult<T> = std::result::Result<T, BarsError>;
