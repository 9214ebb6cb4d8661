//! Volume-delta estimation for the pivot-breakout core.
//!
//! Maintains a windowed directional order-flow estimate per instrument:
//! signed cumulative delta, per-bar imbalance percentage, and a trend
//! classification used by the order-flow entry filter.
//!
//! Two ingestion modes:
//! - *precise*: signed per-tick volume (uptick/downtick or reported
//!   aggressor side)
//! - *approximate*: closed bars, split by close location within the range
//!
//! Classification uses two magnitude thresholds. Slope estimators over short
//! incremental windows are numerically unstable and collapse toward zero,
//! so no regression-based classifier exists here.

pub mod config;
pub mod engine;
pub mod error;

pub use config::FlowConfig;
pub use engine::{FlowReading, FlowTrend, VolumeDeltaEngine};
pub use error::{FlowError, FlowResult};
