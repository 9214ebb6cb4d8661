//! Deterministic bar replay.
//!
//! Feeds a recorded session of closed bars through the same engine the
//! live path uses, with synchronous fills at the intent price. Replaying
//! the same bars against the same configuration produces the identical
//! intent and trade sequence, which is what makes recorded sessions
//! usable as regression fixtures.

use std::fs::File;
use std::io::{BufRead, BufReader};

use rust_decimal::Decimal;
use tracing::{info, warn};

use pivot_core::{Bar, TradeRecord};

use crate::broker::{BrokerLink, ImmediateFillBroker};
use crate::config::AppConfig;
use crate::engine::Engine;
use crate::error::{AppError, AppResult};

/// Outcome of one replay run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub bars: u64,
    pub intents: u64,
    pub trades: Vec<TradeRecord>,
}

impl ReplayReport {
    /// Sum of realized PnL across all closed trades.
    #[must_use]
    pub fn total_pnl(&self) -> Decimal {
        self.trades.iter().map(|t| t.realized_pnl).sum()
    }
}

/// Replay bars from a JSON Lines file (one `Bar` per line).
pub fn run_replay(config: &AppConfig, bars_path: &str) -> AppResult<ReplayReport> {
    let file = File::open(bars_path)
        .map_err(|e| AppError::Replay(format!("Failed to open {bars_path}: {e}")))?;
    let reader = BufReader::new(file);

    let mut bars = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let bar: Bar = serde_json::from_str(&line).map_err(|e| {
            AppError::Replay(format!("{bars_path}:{}: bad bar record: {e}", number + 1))
        })?;
        bars.push(bar);
    }

    info!(path = %bars_path, bars = bars.len(), "Replaying recorded session");
    Ok(replay_bars(config, bars))
}

/// Replay an in-memory bar sequence.
pub fn replay_bars(config: &AppConfig, bars: Vec<Bar>) -> ReplayReport {
    let mut engine = Engine::new(config);
    let mut broker = ImmediateFillBroker::new();
    let mut report = ReplayReport {
        bars: 0,
        intents: 0,
        trades: Vec::new(),
    };

    for bar in bars {
        report.bars += 1;
        for intent in engine.on_closed_bar(bar) {
            report.intents += 1;
            match broker.submit(intent) {
                Ok(Some(outcome)) => {
                    report.trades.extend(engine.on_execution(&outcome));
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Replay fill failed"),
            }
        }
    }

    report
}
