//! Atomic JSON persistence shared by every durable store
//!
//! Writes go to a temp file in the target directory, are fsynced, then
//! renamed over the target while an advisory lock on a sibling `.lock` file
//! is held. Readers take the shared side of the same lock.

use super::StoreError;
use fd_lock::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

fn lock_path(path: &Path) -> PathBuf {
    path.with_extension("lock")
}

fn open_lock_file(path: &Path) -> Result<File, StoreError> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path(path))
        .map_err(|e| StoreError::LockError(format!("Failed to create lock file: {e}")))
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
///
/// # Errors
///
/// Any failure here means the durable store cannot be written and is fatal
/// for the run.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let parent_dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent_dir).map_err(|e| StoreError::IoError(e.to_string()))?;

    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| StoreError::SerializationError(e.to_string()))?;

    let mut lock = RwLock::new(open_lock_file(path)?);
    let _guard = lock
        .write()
        .map_err(|e| StoreError::LockError(format!("Failed to acquire write lock: {e}")))?;

    let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
        .map_err(|e| StoreError::IoError(format!("Failed to create temp file: {e}")))?;
    temp_file
        .write_all(&json)
        .map_err(|e| StoreError::IoError(format!("Failed to write to temp file: {e}")))?;
    temp_file
        .flush()
        .map_err(|e| StoreError::IoError(format!("Failed to flush temp file: {e}")))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| StoreError::IoError(format!("Failed to sync temp file: {e}")))?;
    temp_file
        .persist(path)
        .map_err(|e| StoreError::IoError(format!("Failed to persist temp file: {e}")))?;

    // Make the rename itself durable
    if let Ok(dir) = File::open(parent_dir) {
        let _ = dir.sync_all();
    }

    debug!(path = %path.display(), bytes = json.len(), "Atomic write complete");
    Ok(())
}

/// Read and deserialize `path`.
///
/// Returns `Ok(None)` when the file does not exist. When `max_size` is set,
/// larger files are rejected before being read.
pub fn read_json<T: DeserializeOwned>(
    path: &Path,
    max_size: Option<u64>,
) -> Result<Option<T>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }

    let lock = RwLock::new(open_lock_file(path)?);
    let _guard = lock
        .read()
        .map_err(|e| StoreError::LockError(format!("Failed to acquire read lock: {e}")))?;

    if let Some(max) = max_size {
        let metadata = std::fs::metadata(path).map_err(|e| StoreError::IoError(e.to_string()))?;
        if metadata.len() > max {
            return Err(StoreError::StateTooLarge {
                size: metadata.len(),
                max,
            });
        }
    }

    let contents = std::fs::read(path).map_err(|e| StoreError::IoError(e.to_string()))?;
    serde_json::from_slice(&contents)
        .map(Some)
        .map_err(|e| StoreError::DeserializationError(e.to_string()))
}

/// Best-effort read: a missing, oversized, or corrupt file yields the default
/// value and a warning instead of an error.
pub fn read_json_lenient<T: DeserializeOwned + Default>(
    path: &Path,
    max_size: Option<u64>,
    what: &str,
) -> T {
    match read_json(path, max_size) {
        Ok(Some(value)) => value,
        Ok(None) => {
            debug!(path = %path.display(), "No {what} file found, starting empty");
            T::default()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable {what} file, treating as empty");
            T::default()
        }
    }
}

/// Remove `path` and its lock file if present.
pub fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
    for candidate in [path.to_path_buf(), lock_path(path)] {
        match std::fs::remove_file(&candidate) {
            Ok(()) => debug!(path = %candidate.display(), "Removed state file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::IoError(e.to_string())),
        }
    }
    Ok(())
}
