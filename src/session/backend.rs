// Storage backends for the token store
//
// A backend only moves the stored document in and out of durable storage;
// locking, generations and events live in `TokenStore`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::session::error::StoreResult;
use crate::session::models::StoredSession;

/// Key-value storage holding at most one session document
pub trait SessionBackend: Send + Sync {
    /// Load the stored document, `None` when nothing is stored
    fn load(&self) -> StoreResult<Option<StoredSession>>;

    /// Replace the stored document
    fn store(&self, record: &StoredSession) -> StoreResult<()>;

    /// Remove the stored document; removing nothing is not an error
    fn remove(&self) -> StoreResult<()>;
}

/// Process-local backend, lost on exit
#[derive(Debug, Default)]
pub struct MemoryBackend {
    record: Mutex<Option<StoredSession>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<StoredSession>> {
        // A poisoned slot still holds a whole document
        self.record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionBackend for MemoryBackend {
    fn load(&self) -> StoreResult<Option<StoredSession>> {
        Ok(self.slot().clone())
    }

    fn store(&self, record: &StoredSession) -> StoreResult<()> {
        *self.slot() = Some(record.clone());
        Ok(())
    }

    fn remove(&self) -> StoreResult<()> {
        *self.slot() = None;
        Ok(())
    }
}

/// JSON file backend that survives restarts
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionBackend for FileBackend {
    fn load(&self) -> StoreResult<Option<StoredSession>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if raw.trim().is_empty() {
            return Ok(None);
        }

        match serde_json::from_str::<StoredSession>(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                // Unreadable document counts as signed out
                tracing::warn!("Ignoring corrupt session file {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    fn store(&self, record: &StoredSession) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Write next to the target then rename so readers never see half a file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(record)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn remove(&self) -> StoreResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
