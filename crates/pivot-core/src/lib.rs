//! Core domain types for the pivot-breakout trading core.
//!
//! This crate provides the fundamental types used throughout the system:
//! - `InstrumentId`: stable key for per-instrument state
//! - `Price`, `Size`: precision-safe numeric types
//! - `Tick`, `Bar`, `LevelPlan`: market data and level inputs
//! - `OrderIntent`, `ExecutionOutcome`, `TradeRecord`: broker-facing records

pub mod decimal;
pub mod error;
pub mod instrument;
pub mod intent;
pub mod market;

pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use instrument::{InstrumentId, Side};
pub use intent::{
    ExecutionOutcome, ExecutionStatus, ExitReason, IntentAction, IntentId, OrderIntent, Partial,
    TradeRecord,
};
pub use market::{Aggressor, Bar, LevelPlan, Tick};
