//! JSON Lines trade journal.
//!
//! Completed trades append to a daily `.jsonl` file: each line is a
//! complete JSON object, so an interrupted write corrupts at most one
//! line and the file stays readable.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, info, warn};

use pivot_core::TradeRecord;

use crate::error::PersistenceResult;

/// Active writer state for the daily file.
struct ActiveWriter {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
}

/// Append-only journal of completed trades, one file per day.
pub struct TradeJournal {
    base_dir: PathBuf,
    buffer: Vec<TradeRecord>,
    max_buffer_size: usize,
    active_writer: Option<ActiveWriter>,
}

impl TradeJournal {
    pub fn new(base_dir: impl Into<PathBuf>, max_buffer_size: usize) -> Self {
        let base_dir = base_dir.into();
        if let Err(e) = std::fs::create_dir_all(&base_dir) {
            warn!(?e, dir = %base_dir.display(), "Failed to create journal directory");
        }
        Self {
            base_dir,
            buffer: Vec::with_capacity(max_buffer_size),
            max_buffer_size,
            active_writer: None,
        }
    }

    /// Buffer one completed trade, flushing when the buffer fills.
    pub fn add_record(&mut self, record: TradeRecord) -> PersistenceResult<()> {
        self.buffer.push(record);
        if self.buffer.len() >= self.max_buffer_size {
            self.flush()?;
        }
        Ok(())
    }

    fn close_active_writer(&mut self) {
        if let Some(mut active) = self.active_writer.take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush journal on close");
            }
            info!(
                date = %active.date,
                records = active.records_written,
                "Closed trade journal"
            );
        }
    }

    fn create_new_writer(&mut self, date: &str) -> PersistenceResult<()> {
        let filename = self.base_dir.join(format!("trades_{}.jsonl", date));
        info!(filename = %filename.display(), "Opening trade journal (append mode)");

        // Append mode: never truncates data from an earlier run.
        let file = OpenOptions::new().create(true).append(true).open(&filename)?;
        self.active_writer = Some(ActiveWriter {
            writer: BufWriter::new(file),
            date: date.to_string(),
            records_written: 0,
        });
        Ok(())
    }

    /// Flush buffered trades to the daily file, rotating on date change.
    pub fn flush(&mut self) -> PersistenceResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let needs_rotation = self
            .active_writer
            .as_ref()
            .map(|w| w.date != today)
            .unwrap_or(false);
        if needs_rotation {
            self.close_active_writer();
        }
        if self.active_writer.is_none() {
            self.create_new_writer(&today)?;
        }

        let record_count = self.buffer.len();
        {
            let active = self
                .active_writer
                .as_mut()
                .expect("active_writer should exist");
            for record in &self.buffer {
                let json = serde_json::to_string(record)?;
                writeln!(active.writer, "{}", json)?;
            }
            active.writer.flush()?;
            active.records_written += record_count;
        }

        debug!(date = %today, records = record_count, "Flushed trades to journal");
        self.buffer.clear();
        Ok(())
    }

    /// Flush and close.
    pub fn close(&mut self) -> PersistenceResult<()> {
        self.flush()?;
        self.close_active_writer();
        Ok(())
    }
}

impl Drop for TradeJournal {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(?e, "Failed to flush journal on drop");
        }
        self.close_active_writer();
    }
}
