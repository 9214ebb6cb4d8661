//! Pivot-breakout trading decision core application.
//!
//! Wires the domain crates into one engine: bar aggregation, volume-delta
//! estimation, breakout entry confirmation, position lifecycle management,
//! and session persistence, behind a broker seam that keeps the core free
//! of brokerage specifics.

pub mod app;
pub mod broker;
pub mod config;
pub mod engine;
pub mod error;
pub mod replay;

pub use app::Application;
pub use broker::{BrokerLink, ImmediateFillBroker};
pub use config::{AppConfig, EngineConfig, LevelConfig};
pub use engine::Engine;
pub use error::{AppError, AppResult};
pub use replay::{replay_bars, run_replay, ReplayReport};
