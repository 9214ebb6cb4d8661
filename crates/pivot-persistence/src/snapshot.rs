//! Session state snapshots.
//!
//! One JSON document per session date, written atomically (temp file then
//! rename) so a crash mid-write can never leave a truncated snapshot on
//! disk. Loading a snapshot from an earlier date is a typed error: stale
//! intraday state must never seed a new session.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use pivot_core::{InstrumentId, Side};
use pivot_position::Position;

use crate::error::{PersistenceError, PersistenceResult};

/// Persisted attempt counter for one (instrument, direction).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptState {
    pub instrument: InstrumentId,
    pub side: Side,
    pub count: u32,
}

/// Everything the decision core needs to resume a session after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_date: NaiveDate,
    pub saved_at: DateTime<Utc>,
    pub positions: Vec<Position>,
    pub attempts: Vec<AttemptState>,
}

impl SessionSnapshot {
    pub fn new(session_date: NaiveDate, positions: Vec<Position>, attempts: Vec<AttemptState>) -> Self {
        Self {
            session_date,
            saved_at: Utc::now(),
            positions,
            attempts,
        }
    }
}

/// Reads and writes dated snapshot files under one base directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    base_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        if let Err(e) = fs::create_dir_all(&base_dir) {
            warn!(?e, dir = %base_dir.display(), "Failed to create snapshot directory");
        }
        Self { base_dir }
    }

    fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.base_dir.join(format!("snapshot_{}.json", date))
    }

    /// Persist a snapshot atomically.
    pub fn save(&self, snapshot: &SessionSnapshot) -> PersistenceResult<()> {
        let path = self.path_for(snapshot.session_date);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_vec_pretty(snapshot)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;

        debug!(
            path = %path.display(),
            positions = snapshot.positions.len(),
            "Snapshot saved"
        );
        Ok(())
    }

    /// Load the snapshot for the given session date.
    ///
    /// Returns `Ok(None)` when no snapshot exists for that date. A snapshot
    /// found under the date's filename but carrying a different internal
    /// date is rejected as stale.
    pub fn load(&self, today: NaiveDate) -> PersistenceResult<Option<SessionSnapshot>> {
        let path = self.path_for(today);
        if !path.exists() {
            return Ok(None);
        }
        let snapshot = Self::read(&path)?;
        if snapshot.session_date != today {
            return Err(PersistenceError::StaleSnapshot {
                snapshot_date: snapshot.session_date,
                today,
            });
        }
        info!(
            path = %path.display(),
            positions = snapshot.positions.len(),
            saved_at = %snapshot.saved_at,
            "Snapshot loaded"
        );
        Ok(Some(snapshot))
    }

    fn read(path: &Path) -> PersistenceResult<SessionSnapshot> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pivot_core::{Price, Size};
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn position() -> Position {
        Position::new(
            InstrumentId::new("TEST"),
            Side::Long,
            Price::new(dec!(50)),
            Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap(),
            Size::new(dec!(100)),
            Price::new(dec!(51)),
            dec!(0.5),
        )
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());

        let attempts = vec![AttemptState {
            instrument: InstrumentId::new("TEST"),
            side: Side::Long,
            count: 2,
        }];
        let snapshot = SessionSnapshot::new(date(), vec![position()], attempts);
        store.save(&snapshot).unwrap();

        let loaded = store.load(date()).unwrap().unwrap();
        assert_eq!(loaded.positions, snapshot.positions);
        assert_eq!(loaded.attempts, snapshot.attempts);
    }

    #[test]
    fn test_missing_snapshot_is_none() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert!(store.load(date()).unwrap().is_none());
    }

    #[test]
    fn test_stale_internal_date_rejected() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());

        // Snapshot internally dated yesterday, written under today's name.
        let mut snapshot = SessionSnapshot::new(date(), vec![position()], Vec::new());
        snapshot.session_date = date().pred_opt().unwrap();
        let path = dir.path().join(format!("snapshot_{}.json", date()));
        std::fs::write(&path, serde_json::to_vec(&snapshot).unwrap()).unwrap();

        let err = store.load(date()).unwrap_err();
        assert!(matches!(err, PersistenceError::StaleSnapshot { .. }));
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        store
            .save(&SessionSnapshot::new(date(), vec![position()], Vec::new()))
            .unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![format!("snapshot_{}.json", date())]);
    }

    #[test]
    fn test_overwrite_keeps_latest() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());

        store
            .save(&SessionSnapshot::new(date(), Vec::new(), Vec::new()))
            .unwrap();
        store
            .save(&SessionSnapshot::new(date(), vec![position()], Vec::new()))
            .unwrap();

        let loaded = store.load(date()).unwrap().unwrap();
        assert_eq!(loaded.positions.len(), 1);
    }
}
