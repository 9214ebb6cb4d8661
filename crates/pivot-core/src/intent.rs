//! Order intents and trade records.
//!
//! The decision core never talks to a broker directly: a firing rule emits
//! an `OrderIntent`, and the broker collaborator reports back an
//! `ExecutionOutcome`. Position state mutates only on confirmed fills, which
//! makes collaborator-side retries naturally idempotent.

use crate::{InstrumentId, Price, Side, Size};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique intent identifier for idempotency.
///
/// Every intent must carry a unique id so the broker collaborator can
/// deduplicate retried submissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntentId(String);

impl IntentId {
    /// Create a new unique intent id.
    ///
    /// Format: `pvt_{timestamp_ms}_{uuid_short}`
    pub fn new() -> Self {
        let ts = Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().to_string()[..8];
        Self(format!("pvt_{ts}_{uuid_short}"))
    }

    /// Create from an existing string (for parsing outcomes).
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for IntentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Action requested of the broker collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentAction {
    /// Open a new position.
    Open,
    /// Close a fraction of an open position.
    PartialClose,
    /// Move the protective stop.
    MoveStop,
    /// Close the entire remaining position.
    FullClose,
}

impl fmt::Display for IntentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::PartialClose => write!(f, "PARTIAL_CLOSE"),
            Self::MoveStop => write!(f, "MOVE_STOP"),
            Self::FullClose => write!(f, "FULL_CLOSE"),
        }
    }
}

/// An order intent emitted toward the broker collaborator.
///
/// The core is agnostic to order ids, fill latency and retry policy; those
/// belong to the collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub id: IntentId,
    pub instrument: InstrumentId,
    /// Position direction the intent acts on.
    pub side: Side,
    pub action: IntentAction,
    /// Fraction of the whole position this intent covers (1 for OPEN and
    /// FULL_CLOSE, 0 for MOVE_STOP).
    pub fraction: Decimal,
    pub size: Size,
    pub price: Price,
    /// Audit reason, e.g. `TIME_RULE` or `first_partial`.
    pub reason: String,
}

/// Terminal status of an intent as reported by the broker collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ExecutionStatus {
    /// Intent executed; position state may now mutate.
    Filled { price: Price, size: Size },
    /// Broker rejected the intent.
    Rejected { reason: String },
    /// No terminal answer within the collaborator's deadline.
    TimedOut,
}

/// Outcome of an intent, reconciled back into the decision core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub intent_id: IntentId,
    pub instrument: InstrumentId,
    pub action: IntentAction,
    pub status: ExecutionStatus,
}

/// Reason a position was fully closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// No-progress timeout: held too long with negligible gain.
    TimeRule,
    /// Price crossed the trailing stop.
    TrailingStop,
    /// Forced end-of-session liquidation.
    SessionEnd,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimeRule => write!(f, "TIME_RULE"),
            Self::TrailingStop => write!(f, "TRAILING_STOP"),
            Self::SessionEnd => write!(f, "SESSION_END"),
        }
    }
}

/// A realized partial exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partial {
    /// Fraction of the whole position this partial closed.
    pub fraction: Decimal,
    pub size: Size,
    pub price: Price,
    pub time: DateTime<Utc>,
}

/// Immutable record of a completed trade, created exactly once at full close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub instrument: InstrumentId,
    pub side: Side,
    pub entry_price: Price,
    pub entry_time: DateTime<Utc>,
    pub exit_price: Price,
    pub exit_time: DateTime<Utc>,
    pub shares: Size,
    pub realized_pnl: Decimal,
    pub exit_reason: ExitReason,
    pub partials: Vec<Partial>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_id_unique() {
        let a = IntentId::new();
        let b = IntentId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_intent_id_format() {
        let id = IntentId::new();
        assert!(id.as_str().starts_with("pvt_"));
    }

    #[test]
    fn test_action_display() {
        assert_eq!(IntentAction::Open.to_string(), "OPEN");
        assert_eq!(IntentAction::PartialClose.to_string(), "PARTIAL_CLOSE");
        assert_eq!(IntentAction::MoveStop.to_string(), "MOVE_STOP");
        assert_eq!(IntentAction::FullClose.to_string(), "FULL_CLOSE");
    }

    #[test]
    fn test_exit_reason_display() {
        assert_eq!(ExitReason::TimeRule.to_string(), "TIME_RULE");
        assert_eq!(ExitReason::TrailingStop.to_string(), "TRAILING_STOP");
        assert_eq!(ExitReason::SessionEnd.to_string(), "SESSION_END");
    }
}
