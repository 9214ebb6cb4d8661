//! Multi-instrument bar aggregator.
//!
//! Owns one `BarSeries` per instrument and routes ticks (live) or
//! pre-aggregated bars (replay) into it. Downstream consumers receive the
//! sealed bar as the bar-close event in both modes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pivot_core::{Bar, InstrumentId, Price, Size};

use crate::config::BarsConfig;
use crate::series::BarSeries;

/// Routes ticks into per-instrument bar series.
pub struct BarAggregator {
    config: BarsConfig,
    series: HashMap<InstrumentId, BarSeries>,
}

impl BarAggregator {
    /// Create an aggregator with the given configuration.
    #[must_use]
    pub fn new(config: BarsConfig) -> Self {
        Self {
            config,
            series: HashMap::new(),
        }
    }

    /// Ingest one tick for an instrument. O(1).
    ///
    /// Returns the sealed bar when the tick crosses a bar boundary.
    pub fn update(
        &mut self,
        instrument: &InstrumentId,
        timestamp: DateTime<Utc>,
        price: Price,
        size: Size,
    ) -> Option<Bar> {
        self.series_mut(instrument).update(timestamp, price, size)
    }

    /// Append a pre-aggregated closed bar (replay mode).
    pub fn push_closed(&mut self, bar: Bar) -> Bar {
        let instrument = bar.instrument.clone();
        self.series_mut(&instrument).push_closed(bar)
    }

    /// The series for an instrument, if any ticks or bars have been seen.
    #[must_use]
    pub fn series(&self, instrument: &InstrumentId) -> Option<&BarSeries> {
        self.series.get(instrument)
    }

    fn series_mut(&mut self, instrument: &InstrumentId) -> &mut BarSeries {
        let config = &self.config;
        self.series.entry(instrument.clone()).or_insert_with(|| {
            BarSeries::new(instrument.clone(), config.bar_secs, config.history_cap)
        })
    }
}
