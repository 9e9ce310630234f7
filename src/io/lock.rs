//! Cross-process lock on a notebox data directory.
//!
//! Every `nb` command that touches the collections takes this lock first, so
//! the load/save cycles of two processes never overlap. The lock is an
//! exclusive `flock` on `<data_dir>/.lock`; the file itself is never removed,
//! since all holders must lock the same inode. Closing the handle releases it.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub const LOCK_FILE_NAME: &str = ".lock";

const FIRST_RETRY: Duration = Duration::from_millis(5);
const MAX_RETRY: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not open lock file {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("store is busy: gave up waiting for {path}{}", held_by(.holder))]
    Timeout { path: PathBuf, holder: Option<u32> },
}

fn held_by(holder: &Option<u32>) -> String {
    match holder {
        Some(pid) => format!(" (held by pid {})", pid),
        None => String::new(),
    }
}

/// Exclusive hold on a data directory, released on drop.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
}

impl FileLock {
    /// Wait up to `timeout` for the lock, retrying with a growing backoff.
    pub fn acquire(data_dir: &Path, timeout: Duration) -> Result<FileLock, LockError> {
        let path = data_dir.join(LOCK_FILE_NAME);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| LockError::Open {
                path: path.clone(),
                source,
            })?;

        let deadline = Instant::now() + timeout;
        let mut retry = FIRST_RETRY;
        while !try_lock_exclusive(&file) {
            let now = Instant::now();
            if now >= deadline {
                return Err(LockError::Timeout {
                    holder: read_holder(&path),
                    path,
                });
            }
            std::thread::sleep(retry.min(deadline - now));
            retry = (retry * 2).min(MAX_RETRY);
        }

        if let Err(e) = record_holder(&mut file) {
            log::debug!("could not record pid in {}: {}", path.display(), e);
        }
        log::debug!("locked {}", path.display());
        Ok(FileLock { _file: file })
    }
}

/// Overwrite the lock file with our pid so a waiter can name the holder.
fn record_holder(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    write!(file, "{}", std::process::id())?;
    file.flush()
}

fn read_holder(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> bool {
    use std::os::unix::io::AsRawFd;
    // SAFETY: the descriptor belongs to `file`, which outlives the call
    unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) == 0 }
}

#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn release_on_drop_keeps_lock_file() {
        let tmp = TempDir::new().unwrap();

        let lock = FileLock::acquire(tmp.path(), Duration::from_secs(1)).unwrap();
        drop(lock);
        assert!(tmp.path().join(LOCK_FILE_NAME).exists());

        assert!(FileLock::acquire(tmp.path(), Duration::from_secs(1)).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn timeout_names_holder() {
        let tmp = TempDir::new().unwrap();
        let _held = FileLock::acquire(tmp.path(), Duration::from_secs(1)).unwrap();

        match FileLock::acquire(tmp.path(), Duration::from_millis(50)) {
            Err(LockError::Timeout { holder, .. }) => {
                assert_eq!(holder, Some(std::process::id()));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn waiter_and_newcomer_never_share_the_lock() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_path_buf();
        let first = FileLock::acquire(&dir, Duration::from_secs(1)).unwrap();

        let (acquired_tx, acquired_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let waiter_dir = dir.clone();
        let waiter = thread::spawn(move || {
            let lock = FileLock::acquire(&waiter_dir, Duration::from_secs(5)).unwrap();
            acquired_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            drop(lock);
        });

        // Let the waiter open the file and start polling before the handoff
        thread::sleep(Duration::from_millis(50));
        drop(first);
        acquired_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let newcomer = FileLock::acquire(&dir, Duration::from_millis(200));
        assert!(matches!(newcomer, Err(LockError::Timeout { .. })));

        release_tx.send(()).unwrap();
        waiter.join().unwrap();
        assert!(FileLock::acquire(&dir, Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn missing_dir_is_an_open_error() {
        let tmp = TempDir::new().unwrap();
        let result = FileLock::acquire(&tmp.path().join("missing"), Duration::from_millis(10));
        assert!(matches!(result, Err(LockError::Open { .. })));
    }
}
