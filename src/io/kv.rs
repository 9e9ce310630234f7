use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;

/// Error type for key-value storage access
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("could not read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("could not write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("storage unavailable for key '{0}'")]
    Unavailable(String),
}

/// Flat string-keyed storage holding one document per key.
///
/// Implementations must be safe to share between threads; callers that need
/// read-modify-write consistency serialize on their own.
pub trait KeyValueStore: Send + Sync {
    /// The stored value, or `None` if the key has never been written.
    fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    fn set(&self, key: &str, value: &str) -> Result<(), KvError>;

    fn remove(&self, key: &str) -> Result<(), KvError>;

    /// Directory for side files such as the recovery log, if the store has one.
    fn data_dir(&self) -> Option<&Path> {
        None
    }
}

/// Write `content` to `path` atomically using a temp file + rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

/// Stores each key as `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileKvStore { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KvError::Read { path, source: e }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        let path = self.path_for(key);
        atomic_write(&path, value.as_bytes()).map_err(|e| KvError::Write { path, source: e })
    }

    fn remove(&self, key: &str) -> Result<(), KvError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KvError::Write { path, source: e }),
        }
    }

    fn data_dir(&self) -> Option<&Path> {
        Some(&self.dir)
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryState {
    values: HashMap<String, String>,
    failing_reads: HashSet<String>,
    failing_writes: HashSet<String>,
    /// Remaining successful writes per key before writes start failing
    writes_before_failure: HashMap<String, usize>,
}

/// In-memory store with per-key failure injection
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    state: Mutex<MemoryState>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every read of `key` fail until cleared.
    pub fn fail_reads(&self, key: &str, fail: bool) {
        let mut state = self.state();
        if fail {
            state.failing_reads.insert(key.to_string());
        } else {
            state.failing_reads.remove(key);
        }
    }

    /// Make every write of `key` fail until cleared.
    pub fn fail_writes(&self, key: &str, fail: bool) {
        let mut state = self.state();
        if fail {
            state.failing_writes.insert(key.to_string());
        } else {
            state.failing_writes.remove(key);
            state.writes_before_failure.remove(key);
        }
    }

    /// Let `n` more writes of `key` succeed, then fail every later one.
    pub fn fail_writes_after(&self, key: &str, n: usize) {
        self.state().writes_before_failure.insert(key.to_string(), n);
    }

    /// Raw stored value, bypassing failure injection.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.state().values.get(key).cloned()
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let state = self.state();
        if state.failing_reads.contains(key) {
            return Err(KvError::Unavailable(key.to_string()));
        }
        Ok(state.values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        let mut state = self.state();
        if state.failing_writes.contains(key) {
            return Err(KvError::Unavailable(key.to_string()));
        }
        if let Some(remaining) = state.writes_before_failure.get_mut(key) {
            if *remaining == 0 {
                return Err(KvError::Unavailable(key.to_string()));
            }
            *remaining -= 1;
        }
        state.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), KvError> {
        let mut state = self.state();
        if state.failing_writes.contains(key) {
            return Err(KvError::Unavailable(key.to_string()));
        }
        state.values.remove(key);
        Ok(())
    }
}
