//! Durable session snapshots keyed by session id.
//!
//! A snapshot holds everything needed to continue a session in a fresh
//! process: the session itself, the continuity store, both logs and the
//! next stage to run. Snapshots are only taken at unit and volume
//! boundaries, so a resumed session never picks up a half-drafted unit.
//!
//! Stores must make each `save` atomic: a concurrent or later `load` sees
//! either the previous snapshot or the new one, never a mix.

pub mod file;
pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::CommitLog;
use crate::continuity::ContinuityStore;
use crate::errors::CheckpointError;
use crate::orchestrator::{Session, Stage};
use crate::review::ReviewLog;

pub use file::FileCheckpointStore;
pub use memory::InMemoryCheckpointStore;

/// Snapshot format version, bumped on incompatible changes.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub session: Session,
    pub store: ContinuityStore,
    #[serde(default)]
    pub reviews: ReviewLog,
    #[serde(default)]
    pub commits: CommitLog,
    /// Stage to run when the session continues
    pub next_stage: Stage,
    pub saved_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn new(
        session: Session,
        store: ContinuityStore,
        reviews: ReviewLog,
        commits: CommitLog,
        next_stage: Stage,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            session,
            store,
            reviews,
            commits,
            next_stage,
            saved_at: Utc::now(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session.id
    }
}

/// Keyed snapshot persistence. One writer per session id at a time.
pub trait CheckpointStore: Send + Sync {
    /// Persist `snapshot` under its session id, replacing any previous one.
    fn save(&self, snapshot: &SessionSnapshot) -> Result<(), CheckpointError>;

    /// The latest snapshot for `session_id`, or `None` if there is none.
    fn load(&self, session_id: &str) -> Result<Option<SessionSnapshot>, CheckpointError>;

    /// Delete a session's snapshot. Returns whether one existed.
    fn remove(&self, session_id: &str) -> Result<bool, CheckpointError>;

    /// Ids of all stored sessions, sorted.
    fn list(&self) -> Result<Vec<String>, CheckpointError>;
}

/// Session ids become file names, so keep them to a safe alphabet.
pub fn validate_session_id(session_id: &str) -> Result<(), CheckpointError> {
    let valid = !session_id.is_empty()
        && session_id.len() <= 64
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CheckpointError::InvalidSessionId(session_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_session_id() {
        assert!(validate_session_id("salt-road_01").is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("../etc").is_err());
        assert!(validate_session_id("a b").is_err());
        assert!(validate_session_id(&"x".repeat(65)).is_err());
    }
}
