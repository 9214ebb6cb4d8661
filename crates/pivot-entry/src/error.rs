//! Error types for pivot-entry.

use thiserror::Error;

/// Entry confirmation errors.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid time format '{0}', expected HH:MM")]
    InvalidTimeFormat(String),
}

/// Result type alias for entry operations.
pub type EntryResult<T> = std::result::Result<T, EntryError>;
