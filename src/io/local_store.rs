use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use crate::io::recovery::{self, RecoveryCategory, RecoveryEntry};
use crate::io::refresh::RefreshHook;
use crate::io::store::{DirStore, KvStore, StoreError, keys};

/// The application's own store: reads are served from an in-memory cache,
/// writes update the cache and then go to disk.
///
/// A durable write that fails is kept in a pending queue and retried on
/// [`LocalStore::flush`] (and on [`LocalStore::close`]), so callers never see
/// persistence failures. The failed value is also copied to the recovery log.
pub struct LocalStore {
    backing: DirStore,
    cache: HashMap<String, String>,
    /// Key -> value still to be written (`None` = still to be removed).
    pending: BTreeMap<String, Option<String>>,
    hook: Arc<dyn RefreshHook>,
}

impl LocalStore {
    /// Open the store in `dir` and warm the cache with every known key.
    pub fn open(dir: &Path, hook: Arc<dyn RefreshHook>) -> Result<Self, StoreError> {
        let backing = DirStore::open(dir)?;
        let mut cache = HashMap::new();
        for key in keys::LOCAL {
            match backing.read_raw(key) {
                Ok(Some(value)) => {
                    cache.insert(key.to_string(), value);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(key, error = %e, "could not warm cache"),
            }
        }
        Ok(LocalStore {
            backing,
            cache,
            pending: BTreeMap::new(),
            hook,
        })
    }

    pub fn dir(&self) -> &Path {
        self.backing.dir()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Retry every queued durable write. Entries that still fail stay queued.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        let mut first_error = None;
        let pending = std::mem::take(&mut self.pending);
        for (key, value) in pending {
            let result = match &value {
                Some(v) => self.backing.write_raw(&key, v),
                None => self.backing.remove_raw(&key),
            };
            if let Err(e) = result {
                tracing::warn!(key = %key, error = %e, "flush failed, keeping write queued");
                first_error.get_or_insert(e);
                self.pending.insert(key, value);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Flush and release the store.
    pub fn close(mut self) -> Result<(), StoreError> {
        self.flush()
    }
}

impl KvStore for LocalStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.cache.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.cache.insert(key.to_string(), value.to_string());
        match self.backing.write_raw(key, value) {
            Ok(()) => {
                self.pending.remove(key);
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "durable write failed, queued for flush");
                recovery::log_recovery(
                    self.backing.dir(),
                    RecoveryEntry::new(RecoveryCategory::Write, "local write queued")
                        .field("Key", key)
                        .field("Error", e.to_string())
                        .body(value),
                );
                self.pending.insert(key.to_string(), Some(value.to_string()));
            }
        }
        if key == keys::LOGS {
            self.hook.refresh_needed();
        }
        Ok(())
    }

    fn clear(&mut self, cleared: &[&str]) -> Result<(), StoreError> {
        for key in cleared {
            self.cache.remove(*key);
            if let Err(e) = self.backing.remove_raw(key) {
                tracing::warn!(key, error = %e, "durable remove failed, queued for flush");
                self.pending.insert(key.to_string(), None);
            } else {
                self.pending.remove(*key);
            }
        }
        if cleared.contains(&keys::LOGS) {
            self.hook.refresh_needed();
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
    fn write_is_durable_and_cached() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("app");
        let mut store = LocalStore::open(&dir, Arc::new(NoRefresh)).unwrap();
        store.write(keys::TIER, "pro").unwrap();
        assert_eq!(store.read(keys::TIER).unwrap().as_deref(), Some("pro"));
        store.close().unwrap();

        let reopened = LocalStore::open(&dir, Arc::new(NoRefresh)).unwrap();
        assert_eq!(reopened.read(keys::TIER).unwrap().as_deref(), Some("pro"));
    }

    #[test]
    fn logs_write_signals_refresh() {
        let tmp = TempDir::new().unwrap();
        let hook = Arc::new(CountingRefresh::default());
        let mut store = LocalStore::open(tmp.path(), hook.clone()).unwrap();
        store.write(keys::TIER, "pro").unwrap();
        assert_eq!(hook.count(), 0);
        store.write(keys::LOGS, "[]").unwrap();
        assert_eq!(hook.count(), 1);
    }

    #[test]
    fn clearing_logs_signals_refresh() {
        let tmp = TempDir::new().unwrap();
        let hook = Arc::new(CountingRefresh::default());
        let mut store = LocalStore::open(tmp.path(), hook.clone()).unwrap();
        store.clear(&[keys::BUCKETS]).unwrap();
        assert_eq!(hook.count(), 0);
        store.clear(keys::USER_DATA).unwrap();
        assert_eq!(hook.count(), 1);
    }

    #[test]
    fn failed_durable_write_is_queued_and_flushed() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("app");
        let mut store = LocalStore::open(&dir, Arc::new(NoRefresh)).unwrap();

        fs::remove_dir_all(&dir).unwrap();
        store.write(keys::BUCKETS, "[]").unwrap();
        assert!(store.has_pending());
        // The cache still answers
        assert_eq!(store.read(keys::BUCKETS).unwrap().as_deref(), Some("[]"));
        assert!(store.flush().is_err());
        assert!(store.has_pending());

        fs::create_dir_all(&dir).unwrap();
        store.flush().unwrap();
        assert!(!store.has_pending());
        assert_eq!(
            fs::read_to_string(dir.join("instalog.buckets")).unwrap(),
            "[]"
        );
    }

    #[test]
    fn clear_removes_from_cache_and_disk() {
        let tmp = TempDir::new().unwrap();
        let mut store = LocalStore::open(tmp.path(), Arc::new(NoRefresh)).unwrap();
        store.write(keys::SOFT_PROMPT_SEEN, "true").unwrap();
        store.clear(&[keys::SOFT_PROMPT_SEEN]).unwrap();
        assert_eq!(store.read(keys::SOFT_PROMPT_SEEN).unwrap(), None);
        assert!(!tmp.path().join("instalog.soft_prompt_seen").exists());
    }
}
