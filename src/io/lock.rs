use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const LOCK_FILE: &str = ".lock";
const POLL_INTERVAL: Duration = Duration::from_millis(10);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Exclusive `flock` on a store directory, held until dropped.
///
/// The application and the widget extension take this around every
/// read-modify-write of the shared container.
pub struct FileLock {
    _handle: File,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not create lock file at {path}: {source}")]
    CreateError { path: PathBuf, source: io::Error },
    #[error("timed out waiting for {path}: another instalog process is writing")]
    Timeout { path: PathBuf },
}

impl FileLock {
    /// Poll for the lock on `dir` until it is free or `timeout` passes.
    pub fn acquire(dir: &Path, timeout: Duration) -> Result<Self, LockError> {
        let path = dir.join(LOCK_FILE);
        // Never truncated or unlinked: a second inode at the same path would
        // let two holders in at once.
        let handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| LockError::CreateError {
                path: path.clone(),
                source,
            })?;

        let deadline = Instant::now() + timeout;
        while !try_exclusive(&handle) {
            if Instant::now() >= deadline {
                return Err(LockError::Timeout { path });
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(FileLock { _handle: handle })
    }

    pub fn acquire_default(dir: &Path) -> Result<Self, LockError> {
        Self::acquire(dir, DEFAULT_TIMEOUT)
    }
}

#[cfg(unix)]
fn try_exclusive(file: &File) -> bool {
    use std::os::unix::io::AsRawFd;
    // SAFETY: the descriptor is owned by `file` and outlives the call
    unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) == 0 }
}

#[cfg(not(unix))]
fn try_exclusive(_file: &File) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn relock_after_drop() {
        let tmp = TempDir::new().unwrap();
        drop(FileLock::acquire_default(tmp.path()).unwrap());
        assert!(FileLock::acquire_default(tmp.path()).is_ok());
        assert!(tmp.path().join(LOCK_FILE).exists());
    }

    #[cfg(unix)]
    #[test]
    fn held_lock_times_out_second_caller() {
        let tmp = TempDir::new().unwrap();
        let _held = FileLock::acquire_default(tmp.path()).unwrap();
        let second = FileLock::acquire(tmp.path(), Duration::from_millis(50));
        assert!(matches!(second, Err(LockError::Timeout { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn waiter_gets_lock_once_released() {
        let tmp = TempDir::new().unwrap();
        let held = FileLock::acquire_default(tmp.path()).unwrap();
        let dir = tmp.path().to_path_buf();
        let waiter = thread::spawn(move || FileLock::acquire(&dir, Duration::from_secs(5)).is_ok());
        thread::sleep(Duration::from_millis(30));
        drop(held);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn missing_dir_is_create_error() {
        let tmp = TempDir::new().unwrap();
        let result = FileLock::acquire_default(&tmp.path().join("nope"));
        assert!(matches!(result, Err(LockError::CreateError { .. })));
    }
}
