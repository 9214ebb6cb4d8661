//! Startup reconciliation against the broker.
//!
//! The broker is the source of truth for share counts. Snapshot state
//! supplies the lifecycle bookkeeping (partials taken, stops, attempt
//! counters) that the broker cannot know; wherever the two disagree on
//! what is actually held, the broker wins and the divergence is logged.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use pivot_core::{InstrumentId, Partial, Price, Side, Size};
use pivot_position::Position;

use crate::snapshot::{AttemptState, SessionSnapshot};

/// A position as reported by the broker at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerPosition {
    pub instrument: InstrumentId,
    pub side: Side,
    pub shares: Size,
    pub avg_price: Price,
}

/// State the engine resumes from after reconciliation.
#[derive(Debug, Clone, Default)]
pub struct RecoveredState {
    pub positions: Vec<Position>,
    pub attempts: Vec<AttemptState>,
}

/// Merge snapshot state with the broker's report.
///
/// - snapshot position matched by the broker: kept, share count forced to
///   the broker's. A shortfall is booked as a realized partial at entry so
///   the fraction ledger still sums to one; a surplus rebases the position
///   on the broker's count with a fresh ledger
/// - snapshot position the broker does not hold: dropped loudly
/// - broker position with no snapshot record: adopted bare, with both
///   partials marked done so only the trailing stop and the session
///   exits manage it down
pub fn reconcile(
    snapshot: Option<SessionSnapshot>,
    broker: &[BrokerPosition],
    default_trailing_pct: Decimal,
    now: DateTime<Utc>,
) -> RecoveredState {
    let mut recovered = RecoveredState::default();
    let mut matched: Vec<(InstrumentId, Side)> = Vec::new();

    if let Some(snapshot) = snapshot {
        recovered.attempts = snapshot.attempts;

        for mut position in snapshot.positions {
            let key = (position.instrument.clone(), position.side);
            let Some(held) = broker
                .iter()
                .find(|b| b.instrument == key.0 && b.side == key.1)
            else {
                warn!(
                    instrument = %position.instrument,
                    side = %position.side,
                    remaining = %position.remaining_size(),
                    "Snapshot position not held at broker, dropping"
                );
                continue;
            };
            matched.push(key);

            if position.remaining_size() != held.shares {
                warn!(
                    instrument = %position.instrument,
                    side = %position.side,
                    snapshot_shares = %position.remaining_size(),
                    broker_shares = %held.shares,
                    "Share count divergence, broker wins"
                );
                let new_fraction = if position.shares.is_zero() {
                    Decimal::ONE
                } else {
                    held.shares.inner() / position.shares.inner()
                };
                if position.shares.is_zero() || new_fraction > position.remaining_fraction {
                    // The ledger cannot account for extra shares; rebase on
                    // the broker's count and manage the position down only.
                    position.shares = held.shares;
                    position.remaining_fraction = Decimal::ONE;
                    position.partials.clear();
                    position.first_partial_done = true;
                    position.second_partial_done = true;
                } else {
                    // Book the unseen reduction as a realized partial at the
                    // entry price. The fraction ledger keeps summing to one
                    // and the first-partial rule stays retired.
                    let reduction = position.remaining_fraction - new_fraction;
                    position.partials.push(Partial {
                        fraction: reduction,
                        size: position.shares.fraction(reduction),
                        price: position.entry_price,
                        time: now,
                    });
                    position.remaining_fraction = new_fraction;
                    position.first_partial_done = true;
                }
            }
            recovered.positions.push(position);
        }
    }

    for held in broker {
        if matched
            .iter()
            .any(|(i, s)| *i == held.instrument && *s == held.side)
        {
            continue;
        }
        info!(
            instrument = %held.instrument,
            side = %held.side,
            shares = %held.shares,
            avg_price = %held.avg_price,
            "Adopting broker position with no snapshot record"
        );
        let mut position = Position::new(
            held.instrument.clone(),
            held.side,
            held.avg_price,
            now,
            held.shares,
            Price::ZERO,
            default_trailing_pct,
        );
        position.first_partial_done = true;
        position.second_partial_done = true;
        recovered.positions.push(position);
    }

    recovered
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap()
    }

    fn snapshot_with(positions: Vec<Position>) -> SessionSnapshot {
        SessionSnapshot::new(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            positions,
            vec![AttemptState {
                instrument: InstrumentId::new("TEST"),
                side: Side::Long,
                count: 1,
            }],
        )
    }

    fn position(shares: Decimal) -> Position {
        Position::new(
            InstrumentId::new("TEST"),
            Side::Long,
            Price::new(dec!(50)),
            now(),
            Size::new(shares),
            Price::new(dec!(51)),
            dec!(0.5),
        )
    }

    #[test]
    fn test_broker_share_count_wins() {
        // Snapshot says 100 shares remain; the broker holds only 50.
        let snapshot = snapshot_with(vec![position(dec!(100))]);
        let broker = vec![BrokerPosition {
            instrument: InstrumentId::new("TEST"),
            side: Side::Long,
            shares: Size::new(dec!(50)),
            avg_price: Price::new(dec!(50)),
        }];

        let recovered = reconcile(Some(snapshot), &broker, dec!(0.5), now());
        assert_eq!(recovered.positions.len(), 1);
        let position = &recovered.positions[0];
        assert_eq!(position.remaining_size(), Size::new(dec!(50)));
        // The unseen reduction is on the ledger: fractions still sum to one
        // and the first-partial rule cannot fire again.
        assert_eq!(position.fraction_total(), Decimal::ONE);
        assert_eq!(position.partials.len(), 1);
        assert_eq!(position.partials[0].size, Size::new(dec!(50)));
        assert_eq!(position.partials[0].price, position.entry_price);
        assert!(position.first_partial_done);
        // Lifecycle bookkeeping survives from the snapshot.
        assert_eq!(position.target, Price::new(dec!(51)));
        assert_eq!(recovered.attempts.len(), 1);
    }

    #[test]
    fn test_broker_surplus_rebases_position() {
        // The broker holds more than the snapshot can account for.
        let snapshot = snapshot_with(vec![position(dec!(100))]);
        let broker = vec![BrokerPosition {
            instrument: InstrumentId::new("TEST"),
            side: Side::Long,
            shares: Size::new(dec!(150)),
            avg_price: Price::new(dec!(50)),
        }];

        let recovered = reconcile(Some(snapshot), &broker, dec!(0.5), now());
        let position = &recovered.positions[0];
        assert_eq!(position.shares, Size::new(dec!(150)));
        assert_eq!(position.remaining_fraction, Decimal::ONE);
        assert_eq!(position.fraction_total(), Decimal::ONE);
        assert!(position.partials.is_empty());
        // Manage-down only: the partial rules never fire on a rebased ledger.
        assert!(position.first_partial_done);
        assert!(position.second_partial_done);
    }

    #[test]
    fn test_matching_counts_kept_verbatim() {
        let snapshot = snapshot_with(vec![position(dec!(100))]);
        let broker = vec![BrokerPosition {
            instrument: InstrumentId::new("TEST"),
            side: Side::Long,
            shares: Size::new(dec!(100)),
            avg_price: Price::new(dec!(50)),
        }];

        let recovered = reconcile(Some(snapshot), &broker, dec!(0.5), now());
        assert_eq!(recovered.positions[0].remaining_fraction, Decimal::ONE);
    }

    #[test]
    fn test_snapshot_only_position_dropped() {
        let snapshot = snapshot_with(vec![position(dec!(100))]);
        let recovered = reconcile(Some(snapshot), &[], dec!(0.5), now());
        assert!(recovered.positions.is_empty());
        // Attempts still restore.
        assert_eq!(recovered.attempts.len(), 1);
    }

    #[test]
    fn test_broker_only_position_adopted_bare() {
        let broker = vec![BrokerPosition {
            instrument: InstrumentId::new("OTHER"),
            side: Side::Short,
            shares: Size::new(dec!(200)),
            avg_price: Price::new(dec!(80)),
        }];

        let recovered = reconcile(None, &broker, dec!(0.5), now());
        assert_eq!(recovered.positions.len(), 1);
        let adopted = &recovered.positions[0];
        assert_eq!(adopted.entry_price, Price::new(dec!(80)));
        assert_eq!(adopted.shares, Size::new(dec!(200)));
        // Manage-down only: partial rules never fire.
        assert!(adopted.first_partial_done);
        assert!(adopted.second_partial_done);
    }

    #[test]
    fn test_no_state_anywhere() {
        let recovered = reconcile(None, &[], dec!(0.5), now());
        assert!(recovered.positions.is_empty());
        assert!(recovered.attempts.is_empty());
    }
}
