//! Typed error hierarchy for quill.
//!
//! Generation failures (`ServiceError`, `MalformedResponse`) are resolved
//! inside the stage adapters and never reach the caller. Only
//! `SessionError` crosses the library boundary:
//! - `Configuration` when a session is started with invalid parameters
//! - `CheckpointWrite` when a committed unit cannot be made durable
//! - `CheckpointRead` / `NotFound` when resuming
//! - `Sink` when the caller's unit writer rejects a committed unit
//! - `Continuity` / `Compaction` when a restored snapshot is internally
//!   inconsistent (never raised by a session the orchestrator built itself)

use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by the external generation service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Timeouts, overload and other failures worth retrying.
    #[error("Transient generation failure: {0}")]
    Transient(String),

    /// Failures that will not go away by asking again.
    #[error("Fatal generation failure: {0}")]
    Fatal(String),
}

impl ServiceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }
}

/// A response that could not be turned into the structure a stage expects.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Malformed {stage} response: {reason}")]
pub struct MalformedResponse {
    pub stage: &'static str,
    pub reason: String,
}

/// Invalid session parameters or unreadable configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be a positive integer")]
    NotPositive { field: &'static str },

    #[error("volume_size ({volume_size}) must not exceed milestone_interval ({milestone_interval})")]
    VolumeExceedsMilestone {
        volume_size: u32,
        milestone_interval: u32,
    },

    #[error("Duplicate character '{0}' in roster")]
    DuplicateCharacter(String),

    #[error("Story title must not be empty")]
    MissingTitle,

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Checkpoint persistence failures.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Checkpoint at {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid session id '{0}' (use letters, digits, '-' and '_')")]
    InvalidSessionId(String),

    #[error("Checkpoint store lock poisoned")]
    LockPoisoned,
}

/// Rejected continuity mutations. Nothing is applied when one of these is returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContinuityError {
    #[error("Unit {got} recorded out of order (expected unit {expected})")]
    UnitOutOfOrder { expected: u32, got: u32 },

    #[error("No active thread matches '{0}'")]
    UnknownThread(String),
}

/// Rejected compression requests.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompactionError {
    #[error("Volume {volume} is already compressed (last compressed volume: {last})")]
    AlreadyCompacted { volume: u32, last: u32 },

    #[error("Volume {requested} is not the volume in progress (current volume: {current})")]
    NotCurrentVolume { requested: u32, current: u32 },
}

/// Errors that halt a session and reach the caller.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid session configuration: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Failed to write checkpoint for session {session_id}: {source}")]
    CheckpointWrite {
        session_id: String,
        #[source]
        source: CheckpointError,
    },

    #[error("Failed to read checkpoint for session {session_id}: {source}")]
    CheckpointRead {
        session_id: String,
        #[source]
        source: CheckpointError,
    },

    #[error("No checkpoint found for session {0}")]
    NotFound(String),

    #[error("Unit output writer failed for unit {unit}: {source}")]
    Sink {
        unit: u32,
        #[source]
        source: anyhow::Error,
    },

    /// The session and its continuity store disagree; the checkpoint is inconsistent.
    #[error("Continuity store rejected a commit: {0}")]
    Continuity(#[from] ContinuityError),

    #[error("Volume compression rejected: {0}")]
    Compaction(#[from] CompactionError),
}
