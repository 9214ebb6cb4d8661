//! Error types for pivot-persistence.

use chrono::NaiveDate;
use thiserror::Error;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot belongs to a previous session and must not seed today's
    /// state.
    #[error("Stale snapshot: dated {snapshot_date}, today is {today}")]
    StaleSnapshot {
        snapshot_date: NaiveDate,
        today: NaiveDate,
    },
}

/// Result type alias for persistence operations.
pub type PersistenceResult<T> = std::result::Result<T, PersistenceError>;
