//! Entry confirmation for pivot breakouts.
//!
//! A breakout attempt advances through a bar-close-driven state machine:
//! a pivot breach is classified strong (momentum confirmation at the
//! candle's own close) or weak, and a weak breach races a pullback-retest
//! against a sustained-break hold under a bounded tracking age. Every
//! tentative confirmation must then clear the ordered entry filter chain
//! before it becomes an entry signal.
//!
//! Attempts per (instrument, direction) are bounded per session.

pub mod config;
pub mod error;
pub mod filters;
pub mod phase;
pub mod tracker;
pub mod window;

pub use config::EntryConfig;
pub use error::{EntryError, EntryResult};
pub use filters::{FilterChain, FilterCheck, FilterContext, FilterTrace, FilterVerdict};
pub use phase::{BreakoutPhase, ConfirmationPath, EntryOutcome, EntrySignal};
pub use tracker::BreakoutTracker;
pub use window::EntryWindow;
