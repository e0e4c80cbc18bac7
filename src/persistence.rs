//! Persistence side channel.
//!
//! The engine never touches storage itself. A `Session` hands every
//! committed state to its `Persistence` and reads one back at startup.
//! Failures are reported to the session, which logs and carries on.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PersistError;
use crate::state::SessionState;

/// Envelope format written by `JsonFilePersistence`.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Storage for the present session state.
pub trait Persistence {
    /// Save `state`, replacing whatever was saved before.
    fn persist(&self, state: &SessionState) -> Result<(), PersistError>;

    /// Load the saved state, if there is a usable one.
    fn restore(&self) -> Result<Option<SessionState>, PersistError>;
}

impl<P: Persistence + ?Sized> Persistence for Box<P> {
    fn persist(&self, state: &SessionState) -> Result<(), PersistError> {
        (**self).persist(state)
    }

    fn restore(&self) -> Result<Option<SessionState>, PersistError> {
        (**self).restore()
    }
}

/// Keeps nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPersistence;

impl Persistence for NoopPersistence {
    fn persist(&self, _state: &SessionState) -> Result<(), PersistError> {
        Ok(())
    }

    fn restore(&self) -> Result<Option<SessionState>, PersistError> {
        Ok(None)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    version: u32,
    saved_at: DateTime<Utc>,
    state: SessionState,
}

/// Saves the state as a JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
    max_age: Duration,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            path: path.into(),
            max_age,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved state as seen at `now`.
    pub fn restore_at(&self, now: DateTime<Utc>) -> Result<Option<SessionState>, PersistError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let stored: StoredSession = serde_json::from_str(&raw)?;

        if stored.version != SNAPSHOT_VERSION {
            log::warn!(
                "Ignoring snapshot {} with version {} (expected {})",
                self.path.display(),
                stored.version,
                SNAPSHOT_VERSION
            );
            return Ok(None);
        }
        if now - stored.saved_at > self.max_age {
            log::warn!(
                "Ignoring stale snapshot {} saved at {}",
                self.path.display(),
                stored.saved_at
            );
            return Ok(None);
        }
        Ok(Some(stored.state))
    }

    fn persist_at(&self, state: &SessionState, now: DateTime<Utc>) -> Result<(), PersistError> {
        let stored = StoredSession {
            version: SNAPSHOT_VERSION,
            saved_at: now,
            state: state.clone(),
        };
        let json = serde_json::to_string(&stored)?;

        // replace atomically
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Persistence for JsonFilePersistence {
    fn persist(&self, state: &SessionState) -> Result<(), PersistError> {
        self.persist_at(state, Utc::now())
    }

    fn restore(&self) -> Result<Option<SessionState>, PersistError> {
        self.restore_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "court-queue-{}-{}.json",
            name,
            std::process::id()
        ))
    }

    fn sample_state() -> SessionState {
        let mut state = SessionState::new();
        let now = Utc::now();
        state.start_session(2, 6, now).unwrap();
        state.assign_to_court(1, 1, now).unwrap();
        state
    }

    #[test]
    fn test_round_trip() {
        let path = temp_path("round-trip");
        let store = JsonFilePersistence::new(&path, Duration::hours(24));
        let state = sample_state();

        store.persist(&state).unwrap();
        assert_eq!(store.restore().unwrap(), Some(state));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_restores_nothing() {
        let store = JsonFilePersistence::new(temp_path("missing"), Duration::hours(24));
        assert_eq!(store.restore().unwrap(), None);
    }

    #[test]
    fn test_stale_snapshot_is_ignored() {
        let path = temp_path("stale");
        let store = JsonFilePersistence::new(&path, Duration::hours(24));
        let saved_at = Utc::now() - Duration::hours(25);
        store.persist_at(&sample_state(), saved_at).unwrap();

        assert_eq!(store.restore().unwrap(), None);
        assert!(store.restore_at(saved_at + Duration::hours(1)).unwrap().is_some());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_version_mismatch_is_ignored() {
        let path = temp_path("version");
        let stored = StoredSession {
            version: SNAPSHOT_VERSION + 1,
            saved_at: Utc::now(),
            state: sample_state(),
        };
        fs::write(&path, serde_json::to_string(&stored).unwrap()).unwrap();

        let store = JsonFilePersistence::new(&path, Duration::hours(24));
        assert_eq!(store.restore().unwrap(), None);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let path = temp_path("corrupt");
        fs::write(&path, "{ not json").unwrap();
        let store = JsonFilePersistence::new(&path, Duration::hours(24));
        assert!(matches!(store.restore(), Err(PersistError::Json(_))));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_noop() {
        let store: Box<dyn Persistence> = Box::new(NoopPersistence);
        store.persist(&sample_state()).unwrap();
        assert_eq!(store.restore().unwrap(), None);
    }
}
