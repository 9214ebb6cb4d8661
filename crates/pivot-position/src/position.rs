//! Open position state.
//!
//! Broker-visible state (`remaining_fraction`, `stop_price`, `partials`)
//! mutates only through the `apply_*` fill methods, called when the broker
//! confirms an execution. Observation fields (`best_price`, target and
//! stall tracking) are advanced by the lifecycle manager on every sealed
//! bar and never depend on fills.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use pivot_core::{ExitReason, InstrumentId, Partial, Price, Side, Size, TradeRecord};

use crate::error::{PositionError, PositionResult};

/// One open position and its lifecycle bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: InstrumentId,
    pub side: Side,
    pub entry_price: Price,
    pub entry_time: DateTime<Utc>,
    /// Size at entry; partials reduce `remaining_fraction`, never this.
    pub shares: Size,
    /// Fraction of `shares` still open. Starts at 1.
    pub remaining_fraction: Decimal,
    pub stop_price: Option<Price>,
    /// Active trailing distance %; tightened once after a post-target stall.
    pub trailing_pct: Decimal,
    /// Most favorable price seen since entry.
    pub best_price: Price,
    pub target: Price,
    pub partials: Vec<Partial>,
    pub first_partial_done: bool,
    pub second_partial_done: bool,
    pub tightened: bool,
    pub target_hit_time: Option<DateTime<Utc>>,
    /// Post-target stall window; resets whenever a new favorable extreme
    /// prints.
    pub stall_window_start: Option<DateTime<Utc>>,
    pub stall_high: Option<Price>,
    pub stall_low: Option<Price>,
}

impl Position {
    pub fn new(
        instrument: InstrumentId,
        side: Side,
        entry_price: Price,
        entry_time: DateTime<Utc>,
        shares: Size,
        target: Price,
        trailing_pct: Decimal,
    ) -> Self {
        Self {
            instrument,
            side,
            entry_price,
            entry_time,
            shares,
            remaining_fraction: Decimal::ONE,
            stop_price: None,
            trailing_pct,
            best_price: entry_price,
            target,
            partials: Vec::new(),
            first_partial_done: false,
            second_partial_done: false,
            tightened: false,
            target_hit_time: None,
            stall_window_start: None,
            stall_high: None,
            stall_low: None,
        }
    }

    /// Shares still open.
    #[must_use]
    pub fn remaining_size(&self) -> Size {
        self.shares.fraction(self.remaining_fraction)
    }

    /// Signed per-share gain at the given price.
    #[must_use]
    pub fn gain_per_share(&self, price: Price) -> Decimal {
        (price.inner() - self.entry_price.inner()) * self.side.sign()
    }

    /// Whether `candidate` is at least as favorable as `current` for this
    /// position's stop (higher for long, lower for short).
    #[must_use]
    pub fn stop_is_improvement(&self, candidate: Price) -> bool {
        match self.stop_price {
            None => true,
            Some(current) => match self.side {
                Side::Long => candidate > current,
                Side::Short => candidate < current,
            },
        }
    }

    /// Record a new favorable extreme. Returns true when the extreme moved.
    pub fn observe_extreme(&mut self, price: Price) -> bool {
        let improved = match self.side {
            Side::Long => price > self.best_price,
            Side::Short => price < self.best_price,
        };
        if improved {
            self.best_price = price;
        }
        improved
    }

    /// Apply a confirmed partial-close fill.
    ///
    /// `fraction` is measured against the whole position.
    pub fn apply_partial_fill(
        &mut self,
        fraction: Decimal,
        price: Price,
        size: Size,
        time: DateTime<Utc>,
    ) -> PositionResult<()> {
        if fraction <= Decimal::ZERO || fraction >= self.remaining_fraction {
            return Err(PositionError::InvalidFill(format!(
                "partial fraction {} outside open fraction {}",
                fraction, self.remaining_fraction
            )));
        }
        self.remaining_fraction -= fraction;
        self.partials.push(Partial {
            fraction,
            size,
            price,
            time,
        });
        if self.first_partial_done {
            self.second_partial_done = true;
        } else {
            self.first_partial_done = true;
        }
        info!(
            instrument = %self.instrument,
            side = %self.side,
            fraction = %fraction,
            price = %price,
            remaining = %self.remaining_fraction,
            "Partial fill applied"
        );
        Ok(())
    }

    /// Apply a confirmed stop move.
    pub fn apply_stop_move(&mut self, stop: Price) {
        self.stop_price = Some(stop);
    }

    /// Apply a confirmed full close; produces the immutable trade record.
    pub fn apply_full_close(
        &mut self,
        price: Price,
        time: DateTime<Utc>,
        reason: ExitReason,
    ) -> TradeRecord {
        let sign = self.side.sign();
        let mut pnl: Decimal = self
            .partials
            .iter()
            .map(|p| p.size.inner() * (p.price.inner() - self.entry_price.inner()) * sign)
            .sum();
        pnl += self.remaining_size().inner() * (price.inner() - self.entry_price.inner()) * sign;

        let record = TradeRecord {
            instrument: self.instrument.clone(),
            side: self.side,
            entry_price: self.entry_price,
            entry_time: self.entry_time,
            exit_price: price,
            exit_time: time,
            shares: self.shares,
            realized_pnl: pnl,
            exit_reason: reason,
            partials: self.partials.clone(),
        };
        self.remaining_fraction = Decimal::ZERO;
        info!(
            instrument = %self.instrument,
            side = %self.side,
            exit_price = %price,
            reason = %reason,
            realized_pnl = %pnl,
            "Position closed"
        );
        record
    }

    /// Fraction conservation: realized partials plus the open remainder
    /// always account for exactly the whole position.
    #[must_use]
    pub fn fraction_total(&self) -> Decimal {
        let realized: Decimal = self.partials.iter().map(|p| p.fraction).sum();
        realized + self.remaining_fraction
    }
}
