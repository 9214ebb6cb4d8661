//! Persistence for the pivot-breakout core: session snapshots, the
//! append-only trade journal, and startup reconciliation against the
//! broker's reported holdings.

pub mod error;
pub mod journal;
pub mod recover;
pub mod snapshot;

pub use error::{PersistenceError, PersistenceResult};
pub use journal::TradeJournal;
pub use recover::{reconcile, BrokerPosition, RecoveredState};
pub use snapshot::{AttemptState, SessionSnapshot, SnapshotStore};
