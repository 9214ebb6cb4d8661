//! Breakout attempt phases and confirmation outcomes.

use std::fmt;

use chrono::{DateTime, Utc};
use pivot_core::{InstrumentId, Price, Side};
use serde::{Deserialize, Serialize};

use crate::filters::FilterTrace;

/// Phase of a single breakout attempt.
///
/// Terminal phases (`Confirmed`, `Expired`, `Failed`) consume one attempt;
/// the tracker then resets to `Idle` for the next attempt, if any remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakoutPhase {
    Idle,
    BreakoutDetected,
    WeakTracking,
    PullbackRetest,
    SustainedBreak,
    Confirmed,
    Expired,
    Failed,
}

impl BreakoutPhase {
    /// Whether this phase ends the attempt.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Expired | Self::Failed)
    }
}

impl fmt::Display for BreakoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::BreakoutDetected => "BREAKOUT_DETECTED",
            Self::WeakTracking => "WEAK_TRACKING",
            Self::PullbackRetest => "PULLBACK_RETEST",
            Self::SustainedBreak => "SUSTAINED_BREAK",
            Self::Confirmed => "CONFIRMED",
            Self::Expired => "EXPIRED",
            Self::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// How a confirmed entry earned its confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationPath {
    /// Strong breakout candle confirmed at its own close.
    Momentum,
    /// Weak breakout that receded through the pivot and re-crossed with
    /// momentum-level volume.
    PullbackRetest,
    /// Weak breakout that held beyond the pivot for the minimum duration.
    SustainedBreak,
}

impl fmt::Display for ConfirmationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Momentum => "MOMENTUM",
            Self::PullbackRetest => "PULLBACK_RETEST",
            Self::SustainedBreak => "SUSTAINED_BREAK",
        };
        write!(f, "{}", s)
    }
}

/// A confirmed entry, ready to become an open-order intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySignal {
    pub instrument: InstrumentId,
    pub side: Side,
    pub path: ConfirmationPath,
    /// Close of the confirming candle.
    pub entry_price: Price,
    pub confirmed_at: DateTime<Utc>,
    pub trace: FilterTrace,
}

/// Result of one bar-close evaluation of a breakout tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    /// No breach in progress (or attempts exhausted).
    Idle,
    /// A weak breakout is being tracked; no attempt consumed yet.
    Tracking { phase: BreakoutPhase },
    /// The decision deferred on insufficient data; no attempt consumed.
    NotYet { reason: String },
    /// Entry confirmed; one attempt consumed.
    Confirmed(Box<EntrySignal>),
    /// The filter chain blocked a confirmation; one attempt consumed.
    Rejected { reason: String, trace: FilterTrace },
    /// The weak-tracking window aged out; one attempt consumed.
    Expired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_phases() {
        assert!(BreakoutPhase::Confirmed.is_terminal());
        assert!(BreakoutPhase::Expired.is_terminal());
        assert!(BreakoutPhase::Failed.is_terminal());
        assert!(!BreakoutPhase::Idle.is_terminal());
        assert!(!BreakoutPhase::WeakTracking.is_terminal());
        assert!(!BreakoutPhase::PullbackRetest.is_terminal());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(BreakoutPhase::WeakTracking.to_string(), "WEAK_TRACKING");
        assert_eq!(ConfirmationPath::Momentum.to_string(), "MOMENTUM");
    }
}
