//! Position lifecycle management.
//!
//! Owns open-position state and the exit rule set: the no-progress time
//! exit, two staged partials, a monotone trailing stop with a one-shot
//! post-target stall tighten, and the end-of-session flatten. Rules
//! propose actions; the broker's confirmed fills are the only thing that
//! mutates broker-visible position state.

pub mod config;
pub mod error;
pub mod manager;
pub mod position;

pub use config::PositionConfig;
pub use error::{PositionError, PositionResult};
pub use manager::{PositionAction, PositionManager};
pub use position::Position;
