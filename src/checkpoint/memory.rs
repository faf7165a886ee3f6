//! In-process checkpoint store for tests and embedding.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{CheckpointStore, SessionSnapshot, validate_session_id};
use crate::errors::CheckpointError;

/// Keeps serialized snapshots in memory.
///
/// Snapshots go through JSON like the file store does, so a load never
/// shares state with the orchestrator that saved it.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    snapshots: Mutex<HashMap<String, String>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total successful saves across all sessions.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make every later `save` fail, to exercise halting on write errors.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<(), CheckpointError> {
        validate_session_id(snapshot.session_id())?;
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(CheckpointError::Io {
                path: snapshot.session_id().into(),
                source: std::io::Error::other("checkpoint writes disabled"),
            });
        }
        let json = serde_json::to_string(snapshot).map_err(CheckpointError::Serialize)?;
        self.snapshots
            .lock()
            .map_err(|_| CheckpointError::LockPoisoned)?
            .insert(snapshot.session_id().to_string(), json);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<Option<SessionSnapshot>, CheckpointError> {
        let snapshots = self.snapshots.lock().map_err(|_| CheckpointError::LockPoisoned)?;
        snapshots
            .get(session_id)
            .map(|json| {
                serde_json::from_str(json).map_err(|source| CheckpointError::Corrupt {
                    path: session_id.into(),
                    source,
                })
            })
            .transpose()
    }

    fn remove(&self, session_id: &str) -> Result<bool, CheckpointError> {
        Ok(self
            .snapshots
            .lock()
            .map_err(|_| CheckpointError::LockPoisoned)?
            .remove(session_id)
            .is_some())
    }

    fn list(&self) -> Result<Vec<String>, CheckpointError> {
        let mut ids: Vec<String> = self
            .snapshots
            .lock()
            .map_err(|_| CheckpointError::LockPoisoned)?
            .keys()
            .cloned()
            .collect();
        ids.sort();
        Ok(ids)
    }
}
