//! Per-instrument bar series.
//!
//! Holds the bounded closed-bar history plus the single mutable open bar.
//! Sealing happens lazily: the next tick whose floored boundary is ahead of
//! the open bar seals it, so feed gaps never produce synthetic filler bars.

use std::collections::VecDeque;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use tracing::{debug, trace};

use pivot_core::{Bar, InstrumentId, Price, Size};

/// Bounded per-instrument bar history with one open bar.
#[derive(Debug, Clone)]
pub struct BarSeries {
    instrument: InstrumentId,
    bar_secs: i64,
    history_cap: usize,
    closed: VecDeque<Bar>,
    current: Option<Bar>,
}

impl BarSeries {
    /// Create an empty series.
    #[must_use]
    pub fn new(instrument: InstrumentId, bar_secs: i64, history_cap: usize) -> Self {
        Self {
            instrument,
            bar_secs,
            history_cap,
            closed: VecDeque::with_capacity(history_cap),
            current: None,
        }
    }

    /// Floor a timestamp to the bar-duration boundary.
    fn floor_boundary(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        let secs = timestamp.timestamp();
        let floored = secs - secs.rem_euclid(self.bar_secs);
        Utc.timestamp_opt(floored, 0).unwrap()
    }

    /// Ingest one tick. O(1).
    ///
    /// Returns the sealed bar when this tick crosses a bar boundary; this is
    /// the bar-close event downstream decision logic keys on.
    ///
    /// `size` is treated as the latest cumulative volume reading for the bar
    /// window, not a per-tick delta, to tolerate feeds reporting running
    /// totals.
    pub fn update(&mut self, timestamp: DateTime<Utc>, price: Price, size: Size) -> Option<Bar> {
        let boundary = self.floor_boundary(timestamp);

        match &mut self.current {
            None => {
                self.current = Some(Self::open_bar(self.instrument.clone(), boundary, price, size));
                None
            }
            Some(bar) if bar.open_time == boundary => {
                bar.high = bar.high.max(price);
                bar.low = bar.low.min(price);
                bar.close = price;
                bar.volume = size;
                None
            }
            Some(bar) if boundary > bar.open_time => {
                // Boundary crossed: seal the open bar (even if stale across a
                // gap) and open a new one at the tick's boundary.
                let sealed = bar.clone();
                self.push_history(sealed.clone());
                self.current = Some(Self::open_bar(self.instrument.clone(), boundary, price, size));
                trace!(
                    instrument = %self.instrument,
                    open_time = %sealed.open_time,
                    close = %sealed.close,
                    "Bar sealed"
                );
                Some(sealed)
            }
            Some(bar) => {
                // Tick floored before the open bar: out-of-order feed data.
                // The bar it belongs to is already sealed; drop it.
                debug!(
                    instrument = %self.instrument,
                    tick_boundary = %boundary,
                    open_boundary = %bar.open_time,
                    "Dropping out-of-order tick"
                );
                None
            }
        }
    }

    fn open_bar(instrument: InstrumentId, open_time: DateTime<Utc>, price: Price, size: Size) -> Bar {
        Bar {
            instrument,
            open_time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: size,
        }
    }

    /// Append a pre-aggregated closed bar (replay mode).
    ///
    /// Bypasses tick aggregation but presents the identical bar-close event
    /// shape to consumers, which is required for simulation/live parity.
    pub fn push_closed(&mut self, bar: Bar) -> Bar {
        self.push_history(bar.clone());
        bar
    }

    fn push_history(&mut self, bar: Bar) {
        if self.closed.len() == self.history_cap {
            self.closed.pop_front();
        }
        self.closed.push_back(bar);
    }

    /// Closed bars, oldest first.
    #[must_use]
    pub fn closed(&self) -> &VecDeque<Bar> {
        &self.closed
    }

    /// The mutable open bar, if any (always `None` in replay mode).
    #[must_use]
    pub fn current(&self) -> Option<&Bar> {
        self.current.as_ref()
    }

    /// Most recently closed bar.
    #[must_use]
    pub fn last_closed(&self) -> Option<&Bar> {
        self.closed.back()
    }

    /// Number of closed bars retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.closed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.closed.is_empty()
    }

    /// Average volume over the last `n` closed bars, excluding the most
    /// recent one (the baseline a confirming candle is compared against).
    ///
    /// Returns `None` when fewer than two closed bars exist.
    #[must_use]
    pub fn avg_volume_before_last(&self, n: usize) -> Option<Decimal> {
        if self.closed.len() < 2 {
            return None;
        }
        let end = self.closed.len() - 1;
        let start = end.saturating_sub(n);
        let window = end - start;
        let sum: Decimal = self
            .closed
            .iter()
            .skip(start)
            .take(window)
            .map(|b| b.volume.inner())
            .sum();
        Some(sum / Decimal::from(window as u64))
    }

    /// Average true range over the last `n` closed bars.
    ///
    /// Requires `n + 1` closed bars (each true range needs a previous close).
    /// Returns `None` on insufficient history.
    #[must_use]
    pub fn atr(&self, n: usize) -> Option<Decimal> {
        if n == 0 || self.closed.len() < n + 1 {
            return None;
        }
        let start = self.closed.len() - n;
        let mut sum = Decimal::ZERO;
        for i in start..self.closed.len() {
            let prev_close = self.closed[i - 1].close;
            sum += self.closed[i].true_range(prev_close);
        }
        Some(sum / Decimal::from(n as u64))
    }

    /// High-low range over the last `n` closed bars.
    ///
    /// Returns `None` when fewer than `n` closed bars exist.
    #[must_use]
    pub fn recent_range(&self, n: usize) -> Option<Decimal> {
        if n == 0 || self.closed.len() < n {
            return None;
        }
        let start = self.closed.len() - n;
        let mut high: Option<Price> = None;
        let mut low: Option<Price> = None;
        for bar in self.closed.iter().skip(start) {
            high = Some(high.map_or(bar.high, |h| h.max(bar.high)));
            low = Some(low.map_or(bar.low, |l| l.min(bar.low)));
        }
        match (high, low) {
            (Some(h), Some(l)) => Some(h.inner() - l.inner()),
            _ => None,
        }
    }
}
