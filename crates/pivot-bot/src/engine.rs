//! Decision engine.
//!
//! Wires the pipeline per instrument: sealed bars drive the breakout
//! trackers while flat and the lifecycle rules while a position is open,
//! never both. Every proposal becomes an `OrderIntent` latched per
//! (instrument, action) until its outcome arrives; position state mutates
//! only on confirmed fills, so collaborator-side retries stay idempotent.
//!
//! Live ticks and replayed bars converge on the same bar-close entry
//! point, which keeps the two modes decision-identical.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use pivot_bars::BarAggregator;
use pivot_core::{
    Bar, ExecutionOutcome, ExecutionStatus, ExitReason, InstrumentId, IntentAction, IntentId,
    LevelPlan, OrderIntent, Price, Side, Size, Tick, TradeRecord,
};
use pivot_entry::{BreakoutPhase, BreakoutTracker, EntryOutcome, FilterVerdict};
use pivot_flow::VolumeDeltaEngine;
use pivot_persistence::{AttemptState, RecoveredState, SessionSnapshot};
use pivot_position::{Position, PositionAction, PositionConfig, PositionManager};
use pivot_telemetry::Metrics;

use crate::config::{AppConfig, EngineConfig};

/// Everything needed to reconcile an outcome back into position state.
#[derive(Debug, Clone)]
struct PendingIntent {
    instrument: InstrumentId,
    action: IntentAction,
    side: Side,
    /// Fraction of the whole position, for partial closes.
    fraction: Decimal,
    size: Size,
    price: Price,
    reason: String,
    /// Set for full closes only.
    exit_reason: Option<ExitReason>,
    /// Set for stop moves only.
    stop: Option<Price>,
}

/// Per-instrument decision state.
struct InstrumentState {
    plan: LevelPlan,
    /// One tracker per permitted direction. Empty for adopted positions
    /// that are managed down only.
    trackers: Vec<BreakoutTracker>,
    position: Option<Position>,
    /// Open time of the most recent sealed bar; the deterministic clock
    /// for applying fills.
    last_bar_time: Option<DateTime<Utc>>,
    /// Set when a fill cannot be reconciled into position state. A halted
    /// instrument emits no further intents until operator intervention.
    halted: bool,
}

impl InstrumentState {
    fn new(plan: LevelPlan) -> Self {
        Self {
            plan,
            trackers: Vec::new(),
            position: None,
            last_bar_time: None,
            halted: false,
        }
    }
}

/// The per-session decision core.
pub struct Engine {
    aggregator: BarAggregator,
    flow: VolumeDeltaEngine,
    manager: PositionManager,
    engine_config: EngineConfig,
    position_config: PositionConfig,
    states: HashMap<InstrumentId, InstrumentState>,
    /// One intent per (instrument, action) may be in flight at a time.
    in_flight: HashSet<(InstrumentId, IntentAction)>,
    pending: HashMap<IntentId, PendingIntent>,
}

impl Engine {
    pub fn new(config: &AppConfig) -> Self {
        let mut states = HashMap::new();
        for plan in config.plans() {
            let trackers = plan
                .allowed_sides
                .iter()
                .map(|&side| BreakoutTracker::new(&plan, side, config.entry.clone()))
                .collect();
            states.insert(
                plan.instrument.clone(),
                InstrumentState {
                    plan,
                    trackers,
                    position: None,
                    last_bar_time: None,
                    halted: false,
                },
            );
        }
        Self {
            aggregator: BarAggregator::new(config.bars.clone()),
            flow: VolumeDeltaEngine::new(config.flow.clone()),
            manager: PositionManager::new(config.position.clone()),
            engine_config: config.engine.clone(),
            position_config: config.position.clone(),
            states,
            in_flight: HashSet::new(),
            pending: HashMap::new(),
        }
    }

    /// Ingest one live tick. Ticks for instruments with no configured
    /// level are dropped.
    ///
    /// Decisions fire only when the tick crosses a bar boundary; the
    /// boundary-crossing tick itself belongs to the next bar, in both the
    /// price series and the flow estimate.
    pub fn on_tick(&mut self, tick: &Tick) -> Vec<OrderIntent> {
        if !self.states.contains_key(&tick.instrument) {
            return Vec::new();
        }

        let sealed = self
            .aggregator
            .update(&tick.instrument, tick.timestamp, tick.price, tick.size);
        if let Some(bar) = &sealed {
            self.flow.seal_bar(&bar.instrument);
        }
        self.flow
            .ingest_tick(&tick.instrument, tick.price, tick.size, tick.aggressor);

        match sealed {
            Some(bar) => self.decide(&bar),
            None => Vec::new(),
        }
    }

    /// Ingest one pre-aggregated closed bar (replay mode).
    pub fn on_closed_bar(&mut self, bar: Bar) -> Vec<OrderIntent> {
        if !self.states.contains_key(&bar.instrument) {
            return Vec::new();
        }
        let bar = self.aggregator.push_closed(bar);
        self.flow.ingest_bar(&bar);
        self.decide(&bar)
    }

    /// One decision pass over a sealed bar.
    ///
    /// An open position and entry tracking are mutually exclusive per
    /// instrument: while a position is open only the lifecycle rules run.
    fn decide(&mut self, bar: &Bar) -> Vec<OrderIntent> {
        Metrics::bar_sealed(bar.instrument.as_str());
        let Some(series) = self.aggregator.series(&bar.instrument) else {
            return Vec::new();
        };
        let Some(state) = self.states.get_mut(&bar.instrument) else {
            return Vec::new();
        };
        state.last_bar_time = Some(bar.open_time);
        if state.halted {
            return Vec::new();
        }

        let mut proposals: Vec<PendingIntent> = Vec::new();

        if let Some(position) = state.position.as_mut() {
            for action in self.manager.on_bar(position, bar) {
                proposals.push(match action {
                    PositionAction::PartialClose {
                        fraction,
                        size,
                        price,
                        reason,
                    } => PendingIntent {
                        instrument: bar.instrument.clone(),
                        action: IntentAction::PartialClose,
                        side: position.side,
                        fraction,
                        size,
                        price,
                        reason,
                        exit_reason: None,
                        stop: None,
                    },
                    PositionAction::MoveStop { stop, reason } => PendingIntent {
                        instrument: bar.instrument.clone(),
                        action: IntentAction::MoveStop,
                        side: position.side,
                        fraction: Decimal::ZERO,
                        size: Size::ZERO,
                        price: stop,
                        reason,
                        exit_reason: None,
                        stop: Some(stop),
                    },
                    PositionAction::FullClose { price, reason } => PendingIntent {
                        instrument: bar.instrument.clone(),
                        action: IntentAction::FullClose,
                        side: position.side,
                        fraction: Decimal::ONE,
                        size: position.remaining_size(),
                        price,
                        reason: reason.to_string(),
                        exit_reason: Some(reason),
                        stop: None,
                    },
                });
            }
        } else {
            for tracker in state.trackers.iter_mut() {
                let was_idle = tracker.phase() == BreakoutPhase::Idle;
                let outcome = tracker.on_bar_close(bar, series, &self.flow, None);
                if was_idle && !matches!(outcome, EntryOutcome::Idle) {
                    Metrics::breakout_detected(
                        bar.instrument.as_str(),
                        &tracker.side().to_string(),
                    );
                }
                match outcome {
                    EntryOutcome::Confirmed(signal) => {
                        info!(
                            instrument = %signal.instrument,
                            side = %signal.side,
                            path = %signal.path,
                            price = %signal.entry_price,
                            "Entry confirmed"
                        );
                        Metrics::entry_confirmed(
                            signal.instrument.as_str(),
                            &signal.side.to_string(),
                            &signal.path.to_string(),
                        );
                        proposals.push(PendingIntent {
                            instrument: bar.instrument.clone(),
                            action: IntentAction::Open,
                            side: signal.side,
                            fraction: Decimal::ONE,
                            size: Size::new(self.engine_config.shares_per_trade),
                            price: signal.entry_price,
                            reason: signal.path.to_string(),
                            exit_reason: None,
                            stop: None,
                        });
                        // One open per instrument; the other direction's
                        // tracker waits for the next bar.
                        break;
                    }
                    EntryOutcome::Rejected { reason, trace } => {
                        if let Some(check) = trace
                            .checks
                            .iter()
                            .find(|c| matches!(c.verdict, FilterVerdict::Block(_)))
                        {
                            Metrics::filter_blocked(&check.name, bar.instrument.as_str());
                        }
                        debug!(
                            instrument = %bar.instrument,
                            side = %tracker.side(),
                            reason,
                            "Entry rejected"
                        );
                    }
                    EntryOutcome::Expired => {
                        Metrics::attempt_expired(
                            bar.instrument.as_str(),
                            &tracker.side().to_string(),
                        );
                    }
                    EntryOutcome::NotYet { reason } => {
                        debug!(
                            instrument = %bar.instrument,
                            side = %tracker.side(),
                            reason,
                            "Entry deferred"
                        );
                    }
                    EntryOutcome::Idle | EntryOutcome::Tracking { .. } => {}
                }
            }
        }

        self.register(proposals)
    }

    /// Turn proposals into intents, dropping any whose latch is held.
    fn register(&mut self, proposals: Vec<PendingIntent>) -> Vec<OrderIntent> {
        let mut intents = Vec::new();
        for pending in proposals {
            let key = (pending.instrument.clone(), pending.action);
            if self.in_flight.contains(&key) {
                debug!(
                    instrument = %key.0,
                    action = %key.1,
                    "Intent already in flight, skipped"
                );
                continue;
            }
            let id = IntentId::new();
            let intent = OrderIntent {
                id: id.clone(),
                instrument: pending.instrument.clone(),
                side: pending.side,
                action: pending.action,
                fraction: pending.fraction,
                size: pending.size,
                price: pending.price,
                reason: pending.reason.clone(),
            };
            Metrics::intent_emitted(pending.instrument.as_str(), &pending.action.to_string());
            self.in_flight.insert(key);
            self.pending.insert(id, pending);
            intents.push(intent);
        }
        intents
    }

    /// Reconcile an execution outcome.
    ///
    /// Fills mutate position state; rejections and timeouts only release
    /// the latch, letting the rule re-propose on the next bar. Returns the
    /// trade records produced by any full close.
    pub fn on_execution(&mut self, outcome: &ExecutionOutcome) -> Vec<TradeRecord> {
        let Some(pending) = self.pending.remove(&outcome.intent_id) else {
            warn!(intent_id = %outcome.intent_id, "Outcome for unknown intent");
            return Vec::new();
        };
        self.in_flight
            .remove(&(pending.instrument.clone(), pending.action));
        Metrics::execution_outcome(
            pending.instrument.as_str(),
            &pending.action.to_string(),
            status_label(&outcome.status),
        );

        let (price, size) = match &outcome.status {
            ExecutionStatus::Filled { price, size } => (*price, *size),
            ExecutionStatus::Rejected { reason } => {
                warn!(
                    intent_id = %outcome.intent_id,
                    instrument = %pending.instrument,
                    action = %pending.action,
                    reason,
                    "Intent rejected"
                );
                return Vec::new();
            }
            ExecutionStatus::TimedOut => {
                warn!(
                    intent_id = %outcome.intent_id,
                    instrument = %pending.instrument,
                    action = %pending.action,
                    "Intent timed out"
                );
                return Vec::new();
            }
        };

        let mut records = Vec::new();
        let Some(state) = self.states.get_mut(&pending.instrument) else {
            warn!(instrument = %pending.instrument, "Fill for unknown instrument");
            return records;
        };
        let fill_time = state.last_bar_time.unwrap_or_else(Utc::now);

        match pending.action {
            IntentAction::Open => {
                info!(
                    instrument = %pending.instrument,
                    side = %pending.side,
                    price = %price,
                    shares = %size,
                    "Position opened"
                );
                state.position = Some(Position::new(
                    pending.instrument.clone(),
                    pending.side,
                    price,
                    fill_time,
                    size,
                    state.plan.target,
                    self.position_config.trailing_pct,
                ));
            }
            IntentAction::PartialClose => {
                if let Some(position) = state.position.as_mut() {
                    match position.apply_partial_fill(pending.fraction, price, size, fill_time) {
                        Ok(()) => {
                            Metrics::partial_realized(pending.instrument.as_str(), &pending.reason);
                        }
                        Err(e) => {
                            // The broker executed something the ledger
                            // cannot absorb; re-proposing would keep selling
                            // real shares. Stop the instrument instead.
                            error!(
                                instrument = %pending.instrument,
                                error = %e,
                                "Partial fill does not reconcile, halting instrument"
                            );
                            state.halted = true;
                        }
                    }
                }
            }
            IntentAction::MoveStop => {
                if let (Some(position), Some(stop)) = (state.position.as_mut(), pending.stop) {
                    position.apply_stop_move(stop);
                }
            }
            IntentAction::FullClose => {
                if let Some(mut position) = state.position.take() {
                    let reason = pending.exit_reason.unwrap_or(ExitReason::TrailingStop);
                    let record = position.apply_full_close(price, fill_time, reason);
                    Metrics::position_closed(
                        pending.instrument.as_str(),
                        &reason.to_string(),
                        record.realized_pnl.to_f64().unwrap_or(0.0),
                    );
                    records.push(record);
                }
            }
        }

        Metrics::open_positions_set(self.open_position_count() as i64);
        records
    }

    /// Current session state for persistence.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let positions = self
            .states
            .values()
            .filter_map(|s| s.position.clone())
            .collect();
        let mut attempts = Vec::new();
        for state in self.states.values() {
            for tracker in &state.trackers {
                if tracker.attempt_count() > 0 {
                    attempts.push(AttemptState {
                        instrument: state.plan.instrument.clone(),
                        side: tracker.side(),
                        count: tracker.attempt_count(),
                    });
                }
            }
        }
        SessionSnapshot::new(Utc::now().date_naive(), positions, attempts)
    }

    /// Resume from reconciled state.
    ///
    /// Positions for instruments with no configured level get a bare
    /// state without trackers, so they are managed down but never re-entered.
    pub fn restore(&mut self, recovered: RecoveredState) {
        for attempt in recovered.attempts {
            if let Some(state) = self.states.get_mut(&attempt.instrument) {
                for tracker in state
                    .trackers
                    .iter_mut()
                    .filter(|t| t.side() == attempt.side)
                {
                    tracker.restore_attempts(attempt.count);
                }
            }
        }
        for position in recovered.positions {
            let plan = LevelPlan::new(
                position.instrument.clone(),
                position.entry_price,
                position.target,
                vec![position.side],
            );
            let state = self
                .states
                .entry(position.instrument.clone())
                .or_insert_with(|| InstrumentState::new(plan));
            info!(
                instrument = %position.instrument,
                side = %position.side,
                remaining = %position.remaining_size(),
                "Position restored"
            );
            state.position = Some(position);
        }
        Metrics::open_positions_set(self.open_position_count() as i64);
    }

    /// Replenish all attempt budgets for a new session.
    pub fn reset_session(&mut self) {
        for state in self.states.values_mut() {
            for tracker in state.trackers.iter_mut() {
                tracker.reset_session();
            }
        }
    }

    #[must_use]
    pub fn open_position_count(&self) -> usize {
        self.states.values().filter(|s| s.position.is_some()).count()
    }

    #[must_use]
    pub fn position(&self, instrument: &InstrumentId) -> Option<&Position> {
        self.states.get(instrument)?.position.as_ref()
    }
}

fn status_label(status: &ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Filled { .. } => "filled",
        ExecutionStatus::Rejected { .. } => "rejected",
        ExecutionStatus::TimedOut => "timed_out",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerLink, ImmediateFillBroker};
    use crate::config::LevelConfig;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn config() -> AppConfig {
        AppConfig {
            levels: vec![LevelConfig {
                symbol: "TEST".to_string(),
                pivot: dec!(100),
                target: dec!(102),
                sides: vec![Side::Long],
            }],
            ..Default::default()
        }
    }

    fn t(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn bar(
        minute: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Bar {
        Bar {
            instrument: InstrumentId::new("TEST"),
            open_time: t(minute),
            open: Price::new(open),
            high: Price::new(high),
            low: Price::new(low),
            close: Price::new(close),
            volume: Size::new(volume),
        }
    }

    /// 21 quiet bars below the pivot, establishing the volume baseline.
    fn feed_baseline(engine: &mut Engine) {
        for i in 0..21 {
            let intents = engine.on_closed_bar(bar(
                i,
                dec!(99.5),
                dec!(99.6),
                dec!(99.4),
                dec!(99.5),
                dec!(1000),
            ));
            assert!(intents.is_empty());
        }
    }

    fn fill_all(engine: &mut Engine, broker: &mut ImmediateFillBroker, intents: Vec<OrderIntent>) -> Vec<TradeRecord> {
        let mut records = Vec::new();
        for intent in intents {
            let outcome = broker.submit(intent).unwrap().unwrap();
            records.extend(engine.on_execution(&outcome));
        }
        records
    }

    #[test]
    fn test_momentum_entry_to_session_close() {
        let mut engine = Engine::new(&config());
        let mut broker = ImmediateFillBroker::new();
        feed_baseline(&mut engine);

        // Strong breakout candle: 2.5x volume, 1.0% body, closes above
        // the pivot with plenty of room to the 102 target.
        let intents = engine.on_closed_bar(bar(
            21,
            dec!(99.8),
            dec!(100.8),
            dec!(99.8),
            dec!(100.8),
            dec!(2500),
        ));
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].action, IntentAction::Open);
        assert_eq!(intents[0].size, Size::new(dec!(100)));

        fill_all(&mut engine, &mut broker, intents);
        let position = engine.position(&InstrumentId::new("TEST")).unwrap();
        assert_eq!(position.entry_price, Price::new(dec!(100.8)));
        assert_eq!(engine.open_position_count(), 1);

        // First partial level: 100.8 + 0.25 = 101.05. This bar tags it.
        let intents = engine.on_closed_bar(bar(
            22,
            dec!(100.9),
            dec!(101.4),
            dec!(100.7),
            dec!(101.2),
            dec!(1200),
        ));
        let actions: Vec<IntentAction> = intents.iter().map(|i| i.action).collect();
        assert!(actions.contains(&IntentAction::PartialClose));
        assert!(actions.contains(&IntentAction::MoveStop));

        fill_all(&mut engine, &mut broker, intents);
        let position = engine.position(&InstrumentId::new("TEST")).unwrap();
        assert!(position.first_partial_done);
        assert_eq!(position.remaining_size(), Size::new(dec!(50)));
        // The trail is not armed until the partial realizes, so this bar
        // only moves the stop to breakeven.
        assert_eq!(position.stop_price, Some(Price::new(dec!(100.8))));

        // Past session end: flatten at the close regardless of rules.
        let intents = engine.on_closed_bar(bar(
            356, // 20:56
            dec!(101.0),
            dec!(101.1),
            dec!(100.95),
            dec!(101.0),
            dec!(900),
        ));
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].action, IntentAction::FullClose);

        let records = fill_all(&mut engine, &mut broker, intents);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.exit_reason, ExitReason::SessionEnd);
        // 50 x (101.05 - 100.8) + 50 x (101.0 - 100.8)
        assert_eq!(record.realized_pnl, dec!(22.5));
        assert_eq!(engine.open_position_count(), 0);
        assert!(broker.positions().unwrap().is_empty());
    }

    #[test]
    fn test_open_latch_suppresses_duplicate() {
        let mut engine = Engine::new(&config());
        feed_baseline(&mut engine);

        let first = engine.on_closed_bar(bar(
            21,
            dec!(99.8),
            dec!(100.8),
            dec!(99.8),
            dec!(100.8),
            dec!(2500),
        ));
        assert_eq!(first.len(), 1);

        // No outcome reconciled yet: a second confirmation must not stack
        // a second open order.
        let second = engine.on_closed_bar(bar(
            22,
            dec!(100.0),
            dec!(100.9),
            dec!(100.0),
            dec!(100.9),
            dec!(2600),
        ));
        assert!(second.is_empty());
    }

    #[test]
    fn test_rejection_releases_latch() {
        let mut engine = Engine::new(&config());
        feed_baseline(&mut engine);

        let intents = engine.on_closed_bar(bar(
            21,
            dec!(99.8),
            dec!(100.8),
            dec!(99.8),
            dec!(100.8),
            dec!(2500),
        ));
        assert_eq!(intents.len(), 1);

        let records = engine.on_execution(&ExecutionOutcome {
            intent_id: intents[0].id.clone(),
            instrument: intents[0].instrument.clone(),
            action: intents[0].action,
            status: ExecutionStatus::Rejected {
                reason: "insufficient buying power".to_string(),
            },
        });
        assert!(records.is_empty());
        assert_eq!(engine.open_position_count(), 0);

        // Latch released: the next confirmation may emit again.
        let retry = engine.on_closed_bar(bar(
            22,
            dec!(100.0),
            dec!(100.9),
            dec!(100.0),
            dec!(100.9),
            dec!(2600),
        ));
        assert_eq!(retry.len(), 1);
        assert_eq!(retry[0].action, IntentAction::Open);
    }

    #[test]
    fn test_unknown_instrument_ignored() {
        let mut engine = Engine::new(&config());
        let mut other = bar(0, dec!(10), dec!(10), dec!(10), dec!(10), dec!(100));
        other.instrument = InstrumentId::new("OTHER");
        assert!(engine.on_closed_bar(other).is_empty());
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut engine = Engine::new(&config());
        let mut broker = ImmediateFillBroker::new();
        feed_baseline(&mut engine);
        let intents = engine.on_closed_bar(bar(
            21,
            dec!(99.8),
            dec!(100.8),
            dec!(99.8),
            dec!(100.8),
            dec!(2500),
        ));
        fill_all(&mut engine, &mut broker, intents);

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.positions.len(), 1);
        assert_eq!(snapshot.attempts.len(), 1);
        assert_eq!(snapshot.attempts[0].count, 1);

        let mut resumed = Engine::new(&config());
        resumed.restore(RecoveredState {
            positions: snapshot.positions.clone(),
            attempts: snapshot.attempts.clone(),
        });
        assert_eq!(resumed.open_position_count(), 1);
        let position = resumed.position(&InstrumentId::new("TEST")).unwrap();
        assert_eq!(position.entry_price, Price::new(dec!(100.8)));
    }

    #[test]
    fn test_unreconcilable_partial_fill_halts_instrument() {
        let mut engine = Engine::new(&config());
        let mut broker = ImmediateFillBroker::new();

        // A resumed position whose ledger cannot absorb a half-position
        // partial: half the shares are already gone with no partial on
        // record.
        let mut position = Position::new(
            InstrumentId::new("TEST"),
            Side::Long,
            Price::new(dec!(100.5)),
            t(0),
            Size::new(dec!(100)),
            Price::new(dec!(102)),
            dec!(0.5),
        );
        position.remaining_fraction = dec!(0.5);
        engine.restore(RecoveredState {
            positions: vec![position],
            attempts: Vec::new(),
        });

        let intents = engine.on_closed_bar(bar(
            10,
            dec!(100.6),
            dec!(100.8),
            dec!(100.55),
            dec!(100.8),
            dec!(1000),
        ));
        assert!(intents
            .iter()
            .any(|i| i.action == IntentAction::PartialClose));
        fill_all(&mut engine, &mut broker, intents);

        // The fill could not be applied; the instrument halts instead of
        // re-proposing the same partial on every bar.
        let position = engine.position(&InstrumentId::new("TEST")).unwrap();
        assert!(!position.first_partial_done);
        for minute in 11..14 {
            let intents = engine.on_closed_bar(bar(
                minute,
                dec!(100.7),
                dec!(100.9),
                dec!(100.6),
                dec!(100.8),
                dec!(1000),
            ));
            assert!(intents.is_empty(), "minute {}", minute);
        }
    }
}
