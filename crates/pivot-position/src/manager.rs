//! Position lifecycle rules.
//!
//! `on_bar` is a pure decision pass over one open position and one sealed
//! bar: it proposes actions, it never applies them. Fills come back through
//! the position's `apply_*` methods once the broker confirms. Rule order
//! per bar:
//!
//! 1. session end (flatten, overrides everything)
//! 2. trailing stop trigger, against the stop as it stood entering the bar
//! 3. no-progress exit (only before any partial)
//! 4. first partial + breakeven stop
//! 5. second partial at target
//! 6. trailing stop maintenance (armed after the first partial)
//! 7. post-target stall tighten (once per position)

use chrono::{NaiveTime, Timelike};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use pivot_core::{Bar, ExitReason, Price, Side, Size};

use crate::config::PositionConfig;
use crate::position::Position;

/// An action the lifecycle rules want executed. The engine turns these
/// into order intents; nothing here mutates the position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionAction {
    PartialClose {
        /// Fraction of the whole position.
        fraction: Decimal,
        size: Size,
        price: Price,
        reason: String,
    },
    MoveStop {
        stop: Price,
        reason: String,
    },
    FullClose {
        price: Price,
        reason: ExitReason,
    },
}

/// Evaluates the lifecycle rules for open positions.
#[derive(Debug, Clone)]
pub struct PositionManager {
    config: PositionConfig,
}

impl PositionManager {
    pub fn new(config: PositionConfig) -> Self {
        Self { config }
    }

    /// Evaluate one sealed bar against one open position.
    ///
    /// Advances the position's observation fields (favorable extreme,
    /// target-hit and stall tracking); broker-visible state is untouched.
    /// A full-close action short-circuits the pass.
    pub fn on_bar(&self, position: &mut Position, bar: &Bar) -> Vec<PositionAction> {
        let now = bar.open_time;

        // Session end: ordinary rule, highest priority.
        if let Some(end) = self.config.session_end_time() {
            let tod = NaiveTime::from_hms_opt(now.hour(), now.minute(), now.second())
                .unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).unwrap());
            if tod >= end {
                info!(
                    instrument = %position.instrument,
                    at = %now,
                    "Session end, flattening"
                );
                return vec![PositionAction::FullClose {
                    price: bar.close,
                    reason: ExitReason::SessionEnd,
                }];
            }
        }

        // Trailing stop trigger, against the stop entering this bar.
        if let Some(stop) = position.stop_price {
            let crossed = match position.side {
                Side::Long => bar.low <= stop,
                Side::Short => bar.high >= stop,
            };
            if crossed {
                return vec![PositionAction::FullClose {
                    price: stop,
                    reason: ExitReason::TrailingStop,
                }];
            }
        }

        // No-progress exit. Suppressed once any partial has realized gain.
        if position.partials.is_empty() {
            let held_secs = (now - position.entry_time).num_seconds();
            if held_secs >= self.config.time_rule_after_secs {
                let gain = position.gain_per_share(bar.close);
                if gain < self.config.time_rule_min_gain {
                    info!(
                        instrument = %position.instrument,
                        held_secs,
                        gain = %gain,
                        "No-progress exit"
                    );
                    return vec![PositionAction::FullClose {
                        price: bar.close,
                        reason: ExitReason::TimeRule,
                    }];
                }
            }
        }

        let favorable = match position.side {
            Side::Long => bar.high,
            Side::Short => bar.low,
        };
        let new_extreme = position.observe_extreme(favorable);
        self.track_target_and_stall(position, bar, new_extreme);

        let mut actions = Vec::new();
        let mut stop_proposals: Vec<(Price, &'static str)> = Vec::new();

        // First partial once the favorable extreme covers the configured
        // per-share gain, with a breakeven stop behind it.
        if !position.first_partial_done {
            let level = Price::new(
                position.entry_price.inner()
                    + self.config.first_partial_gain * position.side.sign(),
            );
            if Self::reached(position.side, favorable, level) {
                let fraction = self.config.first_partial_fraction;
                actions.push(PositionAction::PartialClose {
                    fraction,
                    size: position.shares.fraction(fraction),
                    price: level,
                    reason: "first_partial".to_string(),
                });
                stop_proposals.push((position.entry_price, "breakeven"));
            }
        }

        // Second partial at target: a fraction of what remains.
        if position.first_partial_done && !position.second_partial_done {
            if Self::reached(position.side, favorable, position.target) {
                let fraction = self.config.second_partial_fraction * position.remaining_fraction;
                actions.push(PositionAction::PartialClose {
                    fraction,
                    size: position.shares.fraction(fraction),
                    price: position.target,
                    reason: "second_partial".to_string(),
                });
            }
        }

        // Trailing stop maintenance from the favorable extreme. The trail
        // only arms once the first partial has realized; before that the
        // no-progress exit covers the position.
        if position.first_partial_done {
            let signed_trail = -position.trailing_pct * position.side.sign();
            let desired = position.best_price.pct_offset(signed_trail);
            stop_proposals.push((desired, "trailing"));
        }

        // Emit at most one stop move: the most favorable improving proposal.
        let best = stop_proposals
            .into_iter()
            .filter(|(p, _)| position.stop_is_improvement(*p))
            .reduce(|a, b| match position.side {
                Side::Long => {
                    if b.0 > a.0 {
                        b
                    } else {
                        a
                    }
                }
                Side::Short => {
                    if b.0 < a.0 {
                        b
                    } else {
                        a
                    }
                }
            });
        if let Some((stop, reason)) = best {
            debug!(
                instrument = %position.instrument,
                stop = %stop,
                reason,
                "Stop move proposed"
            );
            actions.push(PositionAction::MoveStop {
                stop,
                reason: reason.to_string(),
            });
        }

        actions
    }

    /// Target-hit and stall-window bookkeeping.
    ///
    /// The stall window restarts on every new favorable extreme; the stop
    /// tightens at most once per position.
    fn track_target_and_stall(&self, position: &mut Position, bar: &Bar, new_extreme: bool) {
        if position.target_hit_time.is_none()
            && Self::reached(position.side, position.best_price, position.target)
        {
            position.target_hit_time = Some(bar.open_time);
        }
        if position.target_hit_time.is_none() || position.tightened {
            return;
        }

        if new_extreme || position.stall_window_start.is_none() {
            position.stall_window_start = Some(bar.open_time);
            position.stall_high = Some(bar.high);
            position.stall_low = Some(bar.low);
            return;
        }

        position.stall_high = Some(position.stall_high.unwrap_or(bar.high).max(bar.high));
        position.stall_low = Some(position.stall_low.unwrap_or(bar.low).min(bar.low));

        let (Some(start), Some(high), Some(low)) = (
            position.stall_window_start,
            position.stall_high,
            position.stall_low,
        ) else {
            return;
        };
        if (bar.open_time - start).num_seconds() < self.config.stall_min_secs {
            return;
        }
        if low.is_zero() {
            return;
        }
        let range_pct = (high.inner() - low.inner()) / low.inner() * Decimal::from(100);
        if range_pct <= self.config.stall_range_pct {
            info!(
                instrument = %position.instrument,
                range_pct = %range_pct,
                trailing_pct = %self.config.stall_trailing_pct,
                "Post-target stall, tightening trail"
            );
            position.trailing_pct = self.config.stall_trailing_pct;
            position.tightened = true;
        }
    }

    fn reached(side: Side, favorable: Price, level: Price) -> bool {
        match side {
            Side::Long => favorable >= level,
            Side::Short => favorable <= level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use pivot_core::InstrumentId;
    use rust_decimal_macros::dec;

    fn bar_time(minute: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(
            Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap().timestamp() + minute * 60,
            0,
        )
        .unwrap()
    }

    fn mk_bar(minute: i64, open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Bar {
        Bar {
            instrument: InstrumentId::new("TEST"),
            open_time: bar_time(minute),
            open: Price::new(open),
            high: Price::new(high),
            low: Price::new(low),
            close: Price::new(close),
            volume: Size::new(dec!(1000)),
        }
    }

    fn long_position() -> Position {
        Position::new(
            InstrumentId::new("TEST"),
            Side::Long,
            Price::new(dec!(50)),
            bar_time(0),
            Size::new(dec!(100)),
            Price::new(dec!(51)),
            dec!(0.5),
        )
    }

    fn manager() -> PositionManager {
        PositionManager::new(PositionConfig::default())
    }

    #[test]
    fn test_first_partial_with_breakeven_stop() {
        let mgr = manager();
        let mut pos = long_position();

        let bar = mk_bar(3, dec!(50.10), dec!(50.25), dec!(50.05), dec!(50.20));
        let actions = mgr.on_bar(&mut pos, &bar);

        assert_eq!(actions.len(), 2);
        match &actions[0] {
            PositionAction::PartialClose {
                fraction,
                size,
                price,
                reason,
            } => {
                assert_eq!(*fraction, dec!(0.5));
                assert_eq!(*size, Size::new(dec!(50.0)));
                assert_eq!(*price, Price::new(dec!(50.25)));
                assert_eq!(reason, "first_partial");
            }
            other => panic!("expected partial, got {:?}", other),
        }
        // The trail is not armed yet, so breakeven is the only proposal.
        match &actions[1] {
            PositionAction::MoveStop { stop, reason } => {
                assert_eq!(*stop, Price::new(dec!(50)));
                assert_eq!(reason, "breakeven");
            }
            other => panic!("expected stop move, got {:?}", other),
        }
    }

    #[test]
    fn test_first_partial_gain_is_per_share_not_percent() {
        let mgr = manager();
        // At a 200 entry the trigger stays a quarter away, independent of
        // the price level.
        let mut pos = Position::new(
            InstrumentId::new("TEST"),
            Side::Long,
            Price::new(dec!(200)),
            bar_time(0),
            Size::new(dec!(100)),
            Price::new(dec!(204)),
            dec!(0.5),
        );

        let bar = mk_bar(3, dec!(200.10), dec!(200.30), dec!(200.05), dec!(200.20));
        let actions = mgr.on_bar(&mut pos, &bar);
        match &actions[0] {
            PositionAction::PartialClose { price, .. } => {
                assert_eq!(*price, Price::new(dec!(200.25)));
            }
            other => panic!("expected partial, got {:?}", other),
        }
    }

    #[test]
    fn test_second_partial_takes_fraction_of_remainder() {
        let mgr = manager();
        let mut pos = long_position();
        pos.apply_partial_fill(
            dec!(0.5),
            Price::new(dec!(50.25)),
            Size::new(dec!(50)),
            bar_time(3),
        )
        .unwrap();
        pos.apply_stop_move(Price::new(dec!(50)));
        pos.best_price = Price::new(dec!(50.25));

        let bar = mk_bar(10, dec!(50.80), dec!(51.00), dec!(50.75), dec!(50.98));
        let actions = mgr.on_bar(&mut pos, &bar);

        match &actions[0] {
            PositionAction::PartialClose {
                fraction,
                size,
                price,
                reason,
            } => {
                // Half of the remaining half.
                assert_eq!(*fraction, dec!(0.25));
                assert_eq!(*size, Size::new(dec!(25.00)));
                assert_eq!(*price, Price::new(dec!(51)));
                assert_eq!(reason, "second_partial");
            }
            other => panic!("expected partial, got {:?}", other),
        }
        // Trailing pulls up from the new 51.00 extreme.
        match &actions[1] {
            PositionAction::MoveStop { stop, reason } => {
                assert_eq!(*stop, Price::new(dec!(50.7450)));
                assert_eq!(reason, "trailing");
            }
            other => panic!("expected stop move, got {:?}", other),
        }
        assert_eq!(pos.target_hit_time, Some(bar_time(10)));
    }

    #[test]
    fn test_stall_tightens_trail_once() {
        let mgr = manager();
        let mut pos = long_position();
        pos.apply_partial_fill(
            dec!(0.5),
            Price::new(dec!(50.25)),
            Size::new(dec!(50)),
            bar_time(3),
        )
        .unwrap();
        pos.apply_partial_fill(
            dec!(0.25),
            Price::new(dec!(51)),
            Size::new(dec!(25)),
            bar_time(10),
        )
        .unwrap();
        pos.apply_stop_move(Price::new(dec!(50.745)));

        // New extreme at 51.02 restarts the stall window.
        let spike = mk_bar(10, dec!(50.98), dec!(51.02), dec!(50.95), dec!(51.00));
        mgr.on_bar(&mut pos, &spike);
        assert!(!pos.tightened);
        assert_eq!(pos.stall_window_start, Some(bar_time(10)));

        // Chop inside [50.95, 51.02] without a new extreme.
        for minute in 11..15i64 {
            let chop = mk_bar(minute, dec!(50.99), dec!(51.00), dec!(50.96), dec!(50.98));
            mgr.on_bar(&mut pos, &chop);
            assert!(!pos.tightened, "minute {}", minute);
        }

        // Five minutes in: the band is narrow enough, trail tightens.
        let chop = mk_bar(15, dec!(50.98), dec!(51.00), dec!(50.96), dec!(50.99));
        let actions = mgr.on_bar(&mut pos, &chop);
        assert!(pos.tightened);
        assert_eq!(pos.trailing_pct, dec!(0.1));
        match actions.last().unwrap() {
            PositionAction::MoveStop { stop, reason } => {
                // 51.02 * (1 - 0.1%)
                assert_eq!(*stop, Price::new(dec!(50.96898)));
                assert_eq!(reason, "trailing");
            }
            other => panic!("expected stop move, got {:?}", other),
        }

        // Only once: later quiet bars leave the trail alone.
        pos.apply_stop_move(Price::new(dec!(50.96898)));
        let later = mk_bar(20, dec!(50.98), dec!(51.00), dec!(50.97), dec!(50.99));
        let actions = mgr.on_bar(&mut pos, &later);
        assert!(actions.is_empty());
        assert_eq!(pos.trailing_pct, dec!(0.1));
    }

    #[test]
    fn test_no_progress_exit() {
        let mgr = manager();
        let mut pos = long_position();

        // Eight minutes in, four cents of progress.
        let bar = mk_bar(8, dec!(50.02), dec!(50.06), dec!(50.00), dec!(50.04));
        let actions = mgr.on_bar(&mut pos, &bar);
        assert_eq!(
            actions,
            vec![PositionAction::FullClose {
                price: Price::new(dec!(50.04)),
                reason: ExitReason::TimeRule,
            }]
        );
    }

    #[test]
    fn test_no_progress_exit_suppressed_after_partial() {
        let mgr = manager();
        let mut pos = long_position();
        pos.apply_partial_fill(
            dec!(0.5),
            Price::new(dec!(50.25)),
            Size::new(dec!(50)),
            bar_time(3),
        )
        .unwrap();

        let bar = mk_bar(8, dec!(50.02), dec!(50.06), dec!(50.00), dec!(50.04));
        let actions = mgr.on_bar(&mut pos, &bar);
        assert!(!actions
            .iter()
            .any(|a| matches!(a, PositionAction::FullClose { .. })));
    }

    #[test]
    fn test_no_progress_exit_not_early() {
        let mgr = manager();
        let mut pos = long_position();

        let bar = mk_bar(5, dec!(50.02), dec!(50.06), dec!(50.00), dec!(50.04));
        let actions = mgr.on_bar(&mut pos, &bar);
        assert!(!actions
            .iter()
            .any(|a| matches!(a, PositionAction::FullClose { .. })));
    }

    #[test]
    fn test_trailing_stop_trigger_closes_at_stop() {
        let mgr = manager();
        let mut pos = long_position();
        pos.apply_stop_move(Price::new(dec!(50.745)));
        pos.best_price = Price::new(dec!(51));

        let bar = mk_bar(12, dec!(50.80), dec!(50.85), dec!(50.70), dec!(50.72));
        let actions = mgr.on_bar(&mut pos, &bar);
        assert_eq!(
            actions,
            vec![PositionAction::FullClose {
                price: Price::new(dec!(50.745)),
                reason: ExitReason::TrailingStop,
            }]
        );
    }

    #[test]
    fn test_stop_never_retreats() {
        let mgr = manager();
        let mut pos = long_position();
        pos.apply_partial_fill(
            dec!(0.5),
            Price::new(dec!(50.25)),
            Size::new(dec!(50)),
            bar_time(3),
        )
        .unwrap();
        pos.apply_stop_move(Price::new(dec!(50.765)));
        pos.best_price = Price::new(dec!(51.02));

        // Lower high: the desired trail sits below the standing stop.
        let bar = mk_bar(12, dec!(50.90), dec!(50.95), dec!(50.85), dec!(50.88));
        let actions = mgr.on_bar(&mut pos, &bar);
        assert!(!actions
            .iter()
            .any(|a| matches!(a, PositionAction::MoveStop { .. })));
        assert_eq!(pos.stop_price, Some(Price::new(dec!(50.765))));
    }

    #[test]
    fn test_session_end_flattens() {
        let mgr = manager();
        let mut pos = long_position();
        pos.apply_partial_fill(
            dec!(0.5),
            Price::new(dec!(50.25)),
            Size::new(dec!(50)),
            bar_time(3),
        )
        .unwrap();

        // 20:55 UTC.
        let bar = Bar {
            instrument: InstrumentId::new("TEST"),
            open_time: Utc.with_ymd_and_hms(2024, 3, 1, 20, 55, 0).unwrap(),
            open: Price::new(dec!(50.60)),
            high: Price::new(dec!(50.65)),
            low: Price::new(dec!(50.55)),
            close: Price::new(dec!(50.60)),
            volume: Size::new(dec!(1000)),
        };
        let actions = mgr.on_bar(&mut pos, &bar);
        assert_eq!(
            actions,
            vec![PositionAction::FullClose {
                price: Price::new(dec!(50.60)),
                reason: ExitReason::SessionEnd,
            }]
        );
    }

    #[test]
    fn test_short_side_partial_and_trail() {
        let mgr = manager();
        let mut pos = Position::new(
            InstrumentId::new("TEST"),
            Side::Short,
            Price::new(dec!(50)),
            bar_time(0),
            Size::new(dec!(100)),
            Price::new(dec!(49)),
            dec!(0.5),
        );

        // A 0.25 per-share favorable move down reaches 49.75.
        let bar = mk_bar(3, dec!(49.90), dec!(49.95), dec!(49.75), dec!(49.80));
        let actions = mgr.on_bar(&mut pos, &bar);
        match &actions[0] {
            PositionAction::PartialClose { price, .. } => {
                assert_eq!(*price, Price::new(dec!(49.75)));
            }
            other => panic!("expected partial, got {:?}", other),
        }
        match &actions[1] {
            PositionAction::MoveStop { stop, reason } => {
                assert_eq!(*stop, Price::new(dec!(50)));
                assert_eq!(reason, "breakeven");
            }
            other => panic!("expected stop move, got {:?}", other),
        }
    }
}
