//! Bar aggregation for the pivot-breakout core.
//!
//! Converts a per-instrument tick stream into fixed-duration OHLCV bars.
//! Downstream consumers (entry confirmation, position lifecycle, flow
//! estimation in approximate mode) see only bars; replay mode feeds
//! pre-aggregated bars through the same series type so live and simulated
//! runs present an identical shape.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod series;

pub use aggregator::BarAggregator;
pub use config::BarsConfig;
pub use error::{BarsError, BarsResult};
pub use series::BarSeries;
