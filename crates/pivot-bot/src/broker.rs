//! Broker collaborator seam.
//!
//! The engine never talks to a brokerage API: it emits `OrderIntent`s
//! through this trait and mutates position state only on the execution
//! outcomes that come back. Implementations own order ids, retries and
//! fill deadlines.

use pivot_core::{
    ExecutionOutcome, ExecutionStatus, IntentAction, InstrumentId, OrderIntent, Side,
};
use pivot_persistence::BrokerPosition;
use tracing::debug;

use crate::error::AppResult;

/// Order submission and holdings reporting.
pub trait BrokerLink {
    /// Submit an intent.
    ///
    /// Returns the outcome directly when the broker resolves synchronously;
    /// `None` when the outcome arrives later through another channel.
    fn submit(&mut self, intent: OrderIntent) -> AppResult<Option<ExecutionOutcome>>;

    /// Current holdings as the broker reports them.
    fn positions(&self) -> AppResult<Vec<BrokerPosition>>;
}

/// Fills every intent at its requested price, synchronously.
///
/// Used by replay and paper runs; holdings are tracked so startup
/// reconciliation sees the same report a real broker would give.
#[derive(Debug, Default)]
pub struct ImmediateFillBroker {
    holdings: Vec<BrokerPosition>,
}

impl ImmediateFillBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn holding_mut(&mut self, instrument: &InstrumentId, side: Side) -> Option<usize> {
        self.holdings
            .iter()
            .position(|h| h.instrument == *instrument && h.side == side)
    }
}

impl BrokerLink for ImmediateFillBroker {
    fn submit(&mut self, intent: OrderIntent) -> AppResult<Option<ExecutionOutcome>> {
        debug!(
            intent_id = %intent.id,
            instrument = %intent.instrument,
            action = %intent.action,
            price = %intent.price,
            "Immediate fill"
        );

        match intent.action {
            IntentAction::Open => {
                self.holdings.push(BrokerPosition {
                    instrument: intent.instrument.clone(),
                    side: intent.side,
                    shares: intent.size,
                    avg_price: intent.price,
                });
            }
            IntentAction::PartialClose => {
                if let Some(idx) = self.holding_mut(&intent.instrument, intent.side) {
                    self.holdings[idx].shares = self.holdings[idx].shares - intent.size;
                }
            }
            IntentAction::FullClose => {
                if let Some(idx) = self.holding_mut(&intent.instrument, intent.side) {
                    self.holdings.remove(idx);
                }
            }
            IntentAction::MoveStop => {}
        }

        Ok(Some(ExecutionOutcome {
            intent_id: intent.id,
            instrument: intent.instrument,
            action: intent.action,
            status: ExecutionStatus::Filled {
                price: intent.price,
                size: intent.size,
            },
        }))
    }

    fn positions(&self) -> AppResult<Vec<BrokerPosition>> {
        Ok(self.holdings.clone())
    }
}
