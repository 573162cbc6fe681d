use std::path::Path;
use std::sync::Arc;

use crate::io::lock::FileLock;
use crate::io::refresh::RefreshHook;
use crate::io::store::{DirStore, KvStore, StoreError, keys};

/// The container visible to both the application and the widget extension.
///
/// There is no cache: every read goes to disk so a write from the other
/// process is seen on the next read. Multi-step updates take the container's
/// advisory lock through [`SharedStore::lock`].
pub struct SharedStore {
    backing: DirStore,
    hook: Arc<dyn RefreshHook>,
}

impl SharedStore {
    /// Open the shared container, confirming it is writable.
    pub fn open(dir: &Path, hook: Arc<dyn RefreshHook>) -> Result<Self, StoreError> {
        let backing = DirStore::open(dir)?;
        // Probing the lock proves the container accepts writes.
        FileLock::acquire_default(dir).map_err(|e| StoreError::Unavailable {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(SharedStore { backing, hook })
    }

    pub fn dir(&self) -> &Path {
        self.backing.dir()
    }

    /// Hold the container lock for a read-modify-write sequence.
    pub fn lock(&self) -> Result<SharedTxn<'_>, StoreError> {
        let lock = FileLock::acquire_default(self.backing.dir())?;
        Ok(SharedTxn {
            store: self,
            _lock: lock,
        })
    }

    fn write_unlocked(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.backing.write_raw(key, value)?;
        if key == keys::LOGS {
            self.hook.refresh_needed();
        }
        Ok(())
    }
}

impl KvStore for SharedStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.backing.read_raw(key)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut txn = self.lock()?;
        txn.write(key, value)
    }

    fn clear(&mut self, keys: &[&str]) -> Result<(), StoreError> {
        let mut txn = self.lock()?;
        txn.clear(keys)
    }
}

/// A locked view of the shared container. The lock is released on drop.
pub struct SharedTxn<'a> {
    store: &'a SharedStore,
    _lock: FileLock,
}

impl SharedTxn<'_> {
    /// Add `by` to a counter key.
    pub fn increment(&mut self, key: &str, by: u64) -> Result<u64, StoreError> {
        let next = self.read_u64(key).unwrap_or(0).saturating_add(by);
        self.write(key, &next.to_string())?;
        Ok(next)
    }
}

impl KvStore for SharedTxn<'_> {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.store.backing.read_raw(key)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.store.write_unlocked(key, value)
    }

    fn clear(&mut self, cleared: &[&str]) -> Result<(), StoreError> {
        for key in cleared {
            self.store.backing.remove_raw(key)?;
        }
        if cleared.contains(&keys::LOGS) {
            self.store.hook.refresh_needed();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::refresh::{CountingRefresh, NoRefresh};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn writes_are_visible_to_a_second_handle() {
        let tmp = TempDir::new().unwrap();
        let mut extension = SharedStore::open(tmp.path(), Arc::new(NoRefresh)).unwrap();
        let app = SharedStore::open(tmp.path(), Arc::new(NoRefresh)).unwrap();

        extension.write(keys::LOGS, "[]").unwrap();
        assert_eq!(app.read(keys::LOGS).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn logs_write_signals_refresh() {
        let tmp = TempDir::new().unwrap();
        let hook = Arc::new(CountingRefresh::default());
        let mut store = SharedStore::open(tmp.path(), hook.clone()).unwrap();
        store.write(keys::PRESETS, "[]").unwrap();
        store.write(keys::LOGS, "[]").unwrap();
        assert_eq!(hook.count(), 1);
        store.clear(&[keys::PENDING_WIDGET_CAPTURES]).unwrap();
        assert_eq!(hook.count(), 1);
        store.clear(&[keys::LOGS]).unwrap();
        assert_eq!(hook.count(), 2);
    }

    #[test]
    fn increment_counter_under_lock() {
        let tmp = TempDir::new().unwrap();
        let store = SharedStore::open(tmp.path(), Arc::new(NoRefresh)).unwrap();
        {
            let mut txn = store.lock().unwrap();
            assert_eq!(txn.increment(keys::PENDING_WIDGET_CAPTURES, 1).unwrap(), 1);
            assert_eq!(txn.increment(keys::PENDING_WIDGET_CAPTURES, 2).unwrap(), 3);
        }
        assert_eq!(store.read_u64(keys::PENDING_WIDGET_CAPTURES), Some(3));
    }

    #[test]
    fn unavailable_container() {
        let tmp = TempDir::new().unwrap();
        let blocked = tmp.path().join("group");
        fs::write(&blocked, "not a directory").unwrap();
        let result = SharedStore::open(&blocked, Arc::new(NoRefresh));
        assert!(matches!(result, Err(StoreError::Unavailable { .. })));
    }
}
