//! Per-(instrument, direction) breakout attempt tracking.
//!
//! One tracker owns the full lifecycle of a breakout attempt against a
//! pivot level. All decisions key on completed candles: the tracker is
//! driven by sealed bars only, which keeps live and replay behavior
//! identical.
//!
//! Attempt accounting: `Confirmed`, `Rejected` and `Expired` each consume
//! one of the bounded attempts; a deferral (`NotYet`) does not. Once the
//! attempt budget is spent the tracker ignores further breaches until the
//! session resets it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

use pivot_bars::BarSeries;
use pivot_core::{Bar, InstrumentId, LevelPlan, Price, Side};
use pivot_flow::VolumeDeltaEngine;

use crate::config::EntryConfig;
use crate::filters::{FilterChain, FilterContext};
use crate::phase::{BreakoutPhase, ConfirmationPath, EntryOutcome, EntrySignal};

/// State machine for one (instrument, direction) pair.
#[derive(Debug, Clone)]
pub struct BreakoutTracker {
    instrument: InstrumentId,
    side: Side,
    pivot: Price,
    target: Price,
    config: EntryConfig,
    chain: FilterChain,
    phase: BreakoutPhase,
    /// Open time of the breakout candle for the attempt in flight.
    breakout_time: Option<DateTime<Utc>>,
    /// Price receded through the pivot at least once this attempt.
    pullback_seen: bool,
    /// Price receded beyond the sustain tolerance this attempt.
    tolerance_violated: bool,
    attempt_count: u32,
}

impl BreakoutTracker {
    pub fn new(plan: &LevelPlan, side: Side, config: EntryConfig) -> Self {
        Self {
            instrument: plan.instrument.clone(),
            side,
            pivot: plan.pivot,
            target: plan.target,
            chain: FilterChain::new(config.clone()),
            config,
            phase: BreakoutPhase::Idle,
            breakout_time: None,
            pullback_seen: false,
            tolerance_violated: false,
            attempt_count: 0,
        }
    }

    #[must_use]
    pub fn phase(&self) -> BreakoutPhase {
        self.phase
    }

    #[must_use]
    pub fn side(&self) -> Side {
        self.side
    }

    #[must_use]
    pub fn pivot(&self) -> Price {
        self.pivot
    }

    #[must_use]
    pub fn target(&self) -> Price {
        self.target
    }

    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    #[must_use]
    pub fn attempts_exhausted(&self) -> bool {
        self.attempt_count >= self.config.max_attempts
    }

    /// Restore the attempt count from a recovered session snapshot.
    pub fn restore_attempts(&mut self, count: u32) {
        self.attempt_count = count.min(self.config.max_attempts);
    }

    /// Reset for a new session: attempts replenish, any tracking aborts.
    pub fn reset_session(&mut self) {
        self.attempt_count = 0;
        self.abandon();
    }

    /// Evaluate one sealed bar.
    ///
    /// The bar must already be pushed into `series`; the volume baseline
    /// deliberately excludes the candle under classification.
    pub fn on_bar_close(
        &mut self,
        bar: &Bar,
        series: &BarSeries,
        flow: &VolumeDeltaEngine,
        oscillator: Option<Decimal>,
    ) -> EntryOutcome {
        match self.phase {
            BreakoutPhase::Idle => self.watch_for_breach(bar, series, flow, oscillator),
            BreakoutPhase::WeakTracking | BreakoutPhase::PullbackRetest => {
                self.track_weak(bar, series, flow, oscillator)
            }
            // Transient and terminal phases never persist across calls.
            _ => {
                debug_assert!(false, "tracker left in phase {}", self.phase);
                self.abandon();
                EntryOutcome::Idle
            }
        }
    }

    fn watch_for_breach(
        &mut self,
        bar: &Bar,
        series: &BarSeries,
        flow: &VolumeDeltaEngine,
        oscillator: Option<Decimal>,
    ) -> EntryOutcome {
        if self.attempts_exhausted() {
            return EntryOutcome::Idle;
        }
        if !self.closed_beyond_pivot(bar) {
            return EntryOutcome::Idle;
        }
        if !self.config.entry_window.contains_utc(bar.open_time) {
            debug!(
                instrument = %self.instrument,
                side = %self.side,
                at = %bar.open_time,
                "Pivot breach outside entry window, ignored"
            );
            return EntryOutcome::Idle;
        }

        self.phase = BreakoutPhase::BreakoutDetected;
        self.breakout_time = Some(bar.open_time);
        self.classify_breakout_candle(bar, series, flow, oscillator)
    }

    /// Classify the completed breakout candle as strong or weak.
    fn classify_breakout_candle(
        &mut self,
        bar: &Bar,
        series: &BarSeries,
        flow: &VolumeDeltaEngine,
        oscillator: Option<Decimal>,
    ) -> EntryOutcome {
        let Some(ratio) = self.volume_ratio(bar, series) else {
            // Too little history to judge the candle. Defer without
            // consuming an attempt; the breach is dropped.
            self.abandon();
            return EntryOutcome::NotYet {
                reason: "insufficient volume history".to_string(),
            };
        };
        let body = bar.body_pct();

        if ratio >= self.config.volume_ratio_min && body >= self.config.candle_pct_min {
            info!(
                instrument = %self.instrument,
                side = %self.side,
                volume_ratio = %ratio,
                body_pct = %body,
                "Strong breakout candle"
            );
            return self.confirm_or_fail(bar, ConfirmationPath::Momentum, series, flow, oscillator);
        }

        info!(
            instrument = %self.instrument,
            side = %self.side,
            volume_ratio = %ratio,
            body_pct = %body,
            "Weak breakout, tracking"
        );
        self.phase = BreakoutPhase::WeakTracking;
        self.pullback_seen = false;
        self.tolerance_violated = false;
        EntryOutcome::Tracking {
            phase: self.phase,
        }
    }

    /// Race the pullback-retest and sustained-break paths for a weak
    /// breakout; whichever completes first wins.
    fn track_weak(
        &mut self,
        bar: &Bar,
        series: &BarSeries,
        flow: &VolumeDeltaEngine,
        oscillator: Option<Decimal>,
    ) -> EntryOutcome {
        let Some(started) = self.breakout_time else {
            self.abandon();
            return EntryOutcome::Idle;
        };
        let age_secs = (bar.open_time - started).num_seconds();

        if age_secs > self.config.max_age_secs {
            info!(
                instrument = %self.instrument,
                side = %self.side,
                age_secs,
                "Breakout attempt expired"
            );
            self.finish_attempt(BreakoutPhase::Expired);
            return EntryOutcome::Expired;
        }

        if self.receded_through_pivot(bar) {
            self.pullback_seen = true;
            if self.phase == BreakoutPhase::WeakTracking {
                self.phase = BreakoutPhase::PullbackRetest;
                debug!(
                    instrument = %self.instrument,
                    side = %self.side,
                    "Pullback through pivot observed"
                );
            }
        }
        if self.receded_beyond_tolerance(bar) {
            self.tolerance_violated = true;
        }

        // Pullback retest: recede, then re-cross on momentum-level volume.
        if self.pullback_seen && self.closed_beyond_pivot(bar) {
            if let Some(ratio) = self.volume_ratio(bar, series) {
                if ratio >= self.config.rebreak_ratio_min {
                    info!(
                        instrument = %self.instrument,
                        side = %self.side,
                        volume_ratio = %ratio,
                        "Pullback retest re-cross"
                    );
                    return self.confirm_or_fail(
                        bar,
                        ConfirmationPath::PullbackRetest,
                        series,
                        flow,
                        oscillator,
                    );
                }
            }
        }

        // Sustained break: held beyond the pivot (within tolerance) for the
        // minimum duration.
        if !self.tolerance_violated
            && self.closed_beyond_pivot(bar)
            && age_secs >= self.config.sustain_min_secs
        {
            info!(
                instrument = %self.instrument,
                side = %self.side,
                age_secs,
                "Sustained break held"
            );
            self.phase = BreakoutPhase::SustainedBreak;
            return self.confirm_or_fail(
                bar,
                ConfirmationPath::SustainedBreak,
                series,
                flow,
                oscillator,
            );
        }

        EntryOutcome::Tracking { phase: self.phase }
    }

    /// Run the filter chain on a tentative confirmation. Either way the
    /// attempt ends here.
    fn confirm_or_fail(
        &mut self,
        bar: &Bar,
        path: ConfirmationPath,
        series: &BarSeries,
        flow: &VolumeDeltaEngine,
        oscillator: Option<Decimal>,
    ) -> EntryOutcome {
        let ctx = FilterContext {
            side: self.side,
            pivot: self.pivot,
            target: self.target,
            candle: bar,
            series,
            flow,
            oscillator,
        };
        let trace = self.chain.run(&ctx);

        if let Some(reason) = trace.block_reason() {
            let reason = reason.to_string();
            info!(
                instrument = %self.instrument,
                side = %self.side,
                path = %path,
                reason,
                "Entry rejected by filter chain"
            );
            self.finish_attempt(BreakoutPhase::Failed);
            return EntryOutcome::Rejected { reason, trace };
        }

        let signal = EntrySignal {
            instrument: self.instrument.clone(),
            side: self.side,
            path,
            entry_price: bar.close,
            confirmed_at: bar.open_time,
            trace,
        };
        info!(
            instrument = %self.instrument,
            side = %self.side,
            path = %path,
            entry_price = %signal.entry_price,
            attempt = self.attempt_count + 1,
            "Entry confirmed"
        );
        self.finish_attempt(BreakoutPhase::Confirmed);
        EntryOutcome::Confirmed(Box::new(signal))
    }

    /// Candle volume relative to the baseline average.
    ///
    /// `None` on insufficient history or a zero baseline.
    fn volume_ratio(&self, bar: &Bar, series: &BarSeries) -> Option<Decimal> {
        let avg = series.avg_volume_before_last(self.config.volume_lookback)?;
        if avg.is_zero() {
            return None;
        }
        Some(bar.volume.inner() / avg)
    }

    fn closed_beyond_pivot(&self, bar: &Bar) -> bool {
        match self.side {
            Side::Long => bar.close > self.pivot,
            Side::Short => bar.close < self.pivot,
        }
    }

    fn receded_through_pivot(&self, bar: &Bar) -> bool {
        match self.side {
            Side::Long => bar.low < self.pivot,
            Side::Short => bar.high > self.pivot,
        }
    }

    fn receded_beyond_tolerance(&self, bar: &Bar) -> bool {
        let tol = self.config.sustain_tolerance_pct;
        match self.side {
            Side::Long => bar.low < self.pivot.pct_offset(-tol),
            Side::Short => bar.high > self.pivot.pct_offset(tol),
        }
    }

    /// Consume one attempt and return to idle.
    fn finish_attempt(&mut self, terminal: BreakoutPhase) {
        debug_assert!(terminal.is_terminal());
        self.attempt_count = (self.attempt_count + 1).min(self.config.max_attempts);
        self.abandon();
    }

    /// Drop in-flight tracking state without touching the attempt count.
    fn abandon(&mut self) {
        self.phase = BreakoutPhase::Idle;
        self.breakout_time = None;
        self.pullback_seen = false;
        self.tolerance_violated = false;
    }
}
