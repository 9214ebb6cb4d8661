//! Prometheus metrics for the pivot-breakout core.
//!
//! Covers the decision pipeline end to end: bars sealed, breakout
//! attempts and confirmations, filter blocks, order intents and fills,
//! position exits and realized PnL.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, HistogramVec,
    IntGauge,
};

/// Total bars sealed per instrument.
pub static BARS_SEALED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pivot_bars_sealed_total",
        "Total bars sealed by the aggregator",
        &["instrument"]
    )
    .unwrap()
});

/// Total pivot breaches that started an attempt.
pub static BREAKOUTS_DETECTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pivot_breakouts_detected_total",
        "Total pivot breaches that started a breakout attempt",
        &["instrument", "side"]
    )
    .unwrap()
});

/// Total confirmed entries by confirmation path.
pub static ENTRIES_CONFIRMED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pivot_entries_confirmed_total",
        "Total confirmed entries",
        &["instrument", "side", "path"]
    )
    .unwrap()
});

/// Total entry filter blocks by filter name.
pub static FILTER_BLOCKED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pivot_filter_blocked_total",
        "Total entry filter chain blocks",
        &["filter", "instrument"]
    )
    .unwrap()
});

/// Total attempts that aged out while weak-tracking.
pub static ATTEMPTS_EXPIRED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pivot_attempts_expired_total",
        "Total breakout attempts that expired",
        &["instrument", "side"]
    )
    .unwrap()
});

/// Total order intents emitted by action.
pub static INTENTS_EMITTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pivot_intents_emitted_total",
        "Total order intents emitted",
        &["instrument", "action"]
    )
    .unwrap()
});

/// Total execution outcomes by status.
pub static EXECUTION_OUTCOMES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pivot_execution_outcomes_total",
        "Total execution outcomes reconciled",
        &["instrument", "action", "status"]
    )
    .unwrap()
});

/// Total partial closes realized.
pub static PARTIALS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pivot_partials_total",
        "Total partial closes realized",
        &["instrument", "reason"]
    )
    .unwrap()
});

/// Total full position closes by exit reason.
pub static CLOSES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pivot_closes_total",
        "Total positions fully closed",
        &["instrument", "exit_reason"]
    )
    .unwrap()
});

/// Realized PnL per closed trade in dollars.
pub static TRADE_PNL: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "pivot_trade_pnl",
        "Realized PnL per closed trade",
        &["instrument", "exit_reason"],
        vec![
            -500.0, -200.0, -100.0, -50.0, -20.0, 0.0, 20.0, 50.0, 100.0, 200.0, 500.0, 1000.0,
        ]
    )
    .unwrap()
});

/// Currently open positions.
pub static OPEN_POSITIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("pivot_open_positions", "Currently open positions").unwrap()
});

/// Total snapshot saves.
pub static SNAPSHOTS_SAVED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pivot_snapshots_saved_total",
        "Total session snapshots saved",
        &["result"]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record a sealed bar.
    pub fn bar_sealed(instrument: &str) {
        BARS_SEALED_TOTAL.with_label_values(&[instrument]).inc();
    }

    /// Record a pivot breach starting an attempt.
    pub fn breakout_detected(instrument: &str, side: &str) {
        BREAKOUTS_DETECTED_TOTAL
            .with_label_values(&[instrument, side])
            .inc();
    }

    /// Record a confirmed entry.
    pub fn entry_confirmed(instrument: &str, side: &str, path: &str) {
        ENTRIES_CONFIRMED_TOTAL
            .with_label_values(&[instrument, side, path])
            .inc();
    }

    /// Record an entry filter block.
    pub fn filter_blocked(filter: &str, instrument: &str) {
        FILTER_BLOCKED_TOTAL
            .with_label_values(&[filter, instrument])
            .inc();
    }

    /// Record an expired attempt.
    pub fn attempt_expired(instrument: &str, side: &str) {
        ATTEMPTS_EXPIRED_TOTAL
            .with_label_values(&[instrument, side])
            .inc();
    }

    /// Record an emitted order intent.
    pub fn intent_emitted(instrument: &str, action: &str) {
        INTENTS_EMITTED_TOTAL
            .with_label_values(&[instrument, action])
            .inc();
    }

    /// Record a reconciled execution outcome.
    pub fn execution_outcome(instrument: &str, action: &str, status: &str) {
        EXECUTION_OUTCOMES_TOTAL
            .with_label_values(&[instrument, action, status])
            .inc();
    }

    /// Record a realized partial close.
    pub fn partial_realized(instrument: &str, reason: &str) {
        PARTIALS_TOTAL.with_label_values(&[instrument, reason]).inc();
    }

    /// Record a full close with its realized PnL.
    pub fn position_closed(instrument: &str, exit_reason: &str, pnl: f64) {
        CLOSES_TOTAL
            .with_label_values(&[instrument, exit_reason])
            .inc();
        TRADE_PNL
            .with_label_values(&[instrument, exit_reason])
            .observe(pnl);
    }

    /// Update the open position gauge.
    pub fn open_positions_set(count: i64) {
        OPEN_POSITIONS.set(count);
    }

    /// Record a snapshot save.
    pub fn snapshot_saved(result: &str) {
        SNAPSHOTS_SAVED_TOTAL.with_label_values(&[result]).inc();
    }
}
