//! JSON snapshots on disk, one file per session.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{CheckpointStore, SessionSnapshot, validate_session_id};
use crate::errors::CheckpointError;

/// Stores `<dir>/<session_id>.json`.
///
/// Writes go to a temporary file that is synced and renamed over the
/// snapshot, under an exclusive lock on `<session_id>.lock`, so concurrent
/// writers for one session are serialized and readers never see a partial file.
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", session_id))
    }

    fn lock_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", session_id))
    }

    fn ensure_dir(&self) -> Result<(), CheckpointError> {
        fs::create_dir_all(&self.dir).map_err(|source| CheckpointError::Io {
            path: self.dir.clone(),
            source,
        })
    }

    /// Hold the per-session lock until the returned file is dropped.
    fn lock(&self, session_id: &str) -> Result<File, CheckpointError> {
        let path = self.lock_path(session_id);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| CheckpointError::Io {
                path: path.clone(),
                source,
            })?;
        FileExt::lock_exclusive(&file).map_err(|source| CheckpointError::Io { path, source })?;
        Ok(file)
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CheckpointError + '_ {
    move |source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<(), CheckpointError> {
        let session_id = snapshot.session_id();
        validate_session_id(session_id)?;
        self.ensure_dir()?;
        let json = serde_json::to_string_pretty(snapshot).map_err(CheckpointError::Serialize)?;

        let _guard = self.lock(session_id)?;
        let path = self.snapshot_path(session_id);
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp).map_err(io_error(&tmp))?;
            file.write_all(json.as_bytes()).map_err(io_error(&tmp))?;
            file.sync_all().map_err(io_error(&tmp))?;
        }
        fs::rename(&tmp, &path).map_err(io_error(&path))?;

        debug!(session = session_id, path = %path.display(), "checkpoint written");
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<Option<SessionSnapshot>, CheckpointError> {
        validate_session_id(session_id)?;
        let path = self.snapshot_path(session_id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CheckpointError::Io { path, source }),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| CheckpointError::Corrupt { path, source })
    }

    fn remove(&self, session_id: &str) -> Result<bool, CheckpointError> {
        validate_session_id(session_id)?;
        let path = self.snapshot_path(session_id);
        let existed = match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(source) => return Err(CheckpointError::Io { path, source }),
        };
        let lock = self.lock_path(session_id);
        if let Err(e) = fs::remove_file(&lock)
            && e.kind() != ErrorKind::NotFound
        {
            return Err(CheckpointError::Io { path: lock, source: e });
        }
        Ok(existed)
    }

    fn list(&self) -> Result<Vec<String>, CheckpointError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(CheckpointError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut ids: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .filter(|id| validate_session_id(id).is_ok())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::CommitLog;
    use crate::config::{CapacityLimits, SessionConfig};
    use crate::continuity::ContinuityStore;
    use crate::orchestrator::{Session, Stage};
    use crate::review::ReviewLog;
    use crate::story::StorySeed;
    use tempfile::tempdir;

    fn snapshot(id: &str, unit: u32) -> SessionSnapshot {
        let seed = StorySeed::new("The Salt Road", "A map that redraws itself", 20).with_character("Ilse", &[]);
        let mut session = Session::new(id, seed.clone(), SessionConfig::with_target(20));
        session.current_unit = unit;
        SessionSnapshot::new(
            session,
            ContinuityStore::from_seed(&seed, CapacityLimits::default()),
            ReviewLog::new(),
            CommitLog::new(),
            Stage::UnitPlanning,
        )
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoints"));
        let snap = snapshot("s1", 4);
        store.save(&snap).unwrap();

        let loaded = store.load("s1").unwrap().unwrap();
        assert_eq!(loaded, snap);
        assert!(!dir.path().join("checkpoints/s1.json.tmp").exists());
    }

    #[test]
    fn test_save_replaces_previous() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        store.save(&snapshot("s1", 2)).unwrap();
        store.save(&snapshot("s1", 3)).unwrap();
        assert_eq!(store.load("s1").unwrap().unwrap().session.current_unit, 3);
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("nothing-here"));
        assert!(store.load("absent").unwrap().is_none());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_snapshot_is_reported() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        fs::write(store.snapshot_path("bad"), "{\"version\": 1,").unwrap();
        let err = store.load("bad").unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt { .. }));
    }

    #[test]
    fn test_invalid_id_rejected() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        assert!(matches!(
            store.load("../escape"),
            Err(CheckpointError::InvalidSessionId(_))
        ));
        assert!(store.save(&snapshot("no/slash", 1)).is_err());
    }

    #[test]
    fn test_list_and_remove() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        store.save(&snapshot("b", 1)).unwrap();
        store.save(&snapshot("a", 1)).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(store.list().unwrap(), vec!["a", "b"]);
        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
        assert_eq!(store.list().unwrap(), vec!["b"]);
        assert!(!dir.path().join("a.lock").exists());
    }
}
