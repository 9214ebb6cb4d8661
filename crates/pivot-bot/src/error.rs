//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] pivot_persistence::PersistenceError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] pivot_telemetry::TelemetryError),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Replay error: {0}")]
    Replay(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
