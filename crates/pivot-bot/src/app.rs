//! Main application orchestration.
//!
//! Paper-trading loop: ticks arrive as JSON lines on stdin, fills resolve
//! synchronously through the immediate-fill broker, trade records land in
//! the journal, and the session snapshot is written on an interval and
//! again at shutdown. Startup reconciles any same-day snapshot against
//! the broker's reported holdings before the first tick is processed.

use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use pivot_core::Tick;
use pivot_persistence::{reconcile, PersistenceError, SnapshotStore, TradeJournal};
use pivot_telemetry::Metrics;

use crate::broker::{BrokerLink, ImmediateFillBroker};
use crate::config::AppConfig;
use crate::engine::Engine;
use crate::error::AppResult;

/// Main application.
pub struct Application {
    config: AppConfig,
    engine: Engine,
    broker: ImmediateFillBroker,
    store: SnapshotStore,
    journal: TradeJournal,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let engine = Engine::new(&config);
        let store = SnapshotStore::new(&config.persistence.data_dir);
        let journal = TradeJournal::new(
            &config.persistence.data_dir,
            config.persistence.buffer_size,
        );
        Ok(Self {
            config,
            engine,
            broker: ImmediateFillBroker::new(),
            store,
            journal,
        })
    }

    /// Reconcile persisted session state against the broker.
    ///
    /// Must run before the first tick: an open position from before a
    /// restart has to be managed from the first bar onward.
    pub fn recover(&mut self) -> AppResult<()> {
        let today = Utc::now().date_naive();
        let snapshot = match self.store.load(today) {
            Ok(snapshot) => snapshot,
            Err(e @ PersistenceError::StaleSnapshot { .. }) => {
                warn!(error = %e, "Ignoring stale snapshot");
                None
            }
            Err(e) => return Err(e.into()),
        };
        let held = self.broker.positions()?;

        if snapshot.is_none() && held.is_empty() {
            info!("No prior session state, starting clean");
            return Ok(());
        }

        let recovered = reconcile(
            snapshot,
            &held,
            self.config.position.trailing_pct,
            Utc::now(),
        );
        info!(
            positions = recovered.positions.len(),
            attempts = recovered.attempts.len(),
            "Session state recovered"
        );
        self.engine.restore(recovered);
        Ok(())
    }

    /// Run the application until stdin closes or a shutdown signal arrives.
    pub async fn run(mut self) -> AppResult<()> {
        info!(
            levels = self.config.levels.len(),
            "Entering main event loop"
        );

        let (tick_tx, mut tick_rx) = mpsc::channel::<Tick>(1000);
        let reader_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<Tick>(&line) {
                            Ok(tick) => {
                                if tick_tx.send(tick).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!(error = %e, "Bad tick record, skipped"),
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "Tick feed read failed");
                        break;
                    }
                }
            }
        });

        let mut snapshot_interval = tokio::time::interval(Duration::from_secs(
            self.config.engine.snapshot_interval_secs,
        ));
        let mut trade_count = 0u64;

        loop {
            tokio::select! {
                maybe_tick = tick_rx.recv() => {
                    let Some(tick) = maybe_tick else {
                        info!("Tick feed ended");
                        break;
                    };
                    if let Err(e) = self.process_tick(&tick, &mut trade_count) {
                        warn!(error = %e, "Tick processing error");
                    }
                }

                _ = snapshot_interval.tick() => {
                    self.save_snapshot();
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        info!(trade_count, "Shutting down");
        self.save_snapshot();
        self.journal.close()?;
        reader_handle.abort();
        Ok(())
    }

    fn process_tick(&mut self, tick: &Tick, trade_count: &mut u64) -> AppResult<()> {
        for intent in self.engine.on_tick(tick) {
            let Some(outcome) = self.broker.submit(intent)? else {
                continue;
            };
            for record in self.engine.on_execution(&outcome) {
                *trade_count += 1;
                info!(
                    instrument = %record.instrument,
                    side = %record.side,
                    realized_pnl = %record.realized_pnl,
                    exit_reason = %record.exit_reason,
                    "Trade completed (#{trade_count})"
                );
                self.journal.add_record(record)?;
            }
        }
        Ok(())
    }

    fn save_snapshot(&mut self) {
        let snapshot = self.engine.snapshot();
        match self.store.save(&snapshot) {
            Ok(()) => Metrics::snapshot_saved("ok"),
            Err(e) => {
                warn!(error = %e, "Snapshot save failed");
                Metrics::snapshot_saved("error");
            }
        }
    }
}
