use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::io::lock::LockError;
use crate::io::recovery::{self, RecoveryCategory, RecoveryEntry};
use crate::parse::{self, DecodeError};

/// Persisted keys. File names drop the leading `@` and map `/` to `.`.
pub mod keys {
    pub const LOGS: &str = "@instalog/logs";
    pub const BUCKETS: &str = "@instalog/buckets";
    pub const PRESETS: &str = "@instalog/presets";
    pub const TIER: &str = "@instalog/subscription_tier";
    pub const TOTAL_LOG_COUNT: &str = "@instalog/total_log_count";
    pub const SOFT_PROMPT_SEEN: &str = "@instalog/soft_prompt_seen";
    pub const BADGE_SEEN: &str = "@instalog/badge_seen";
    pub const PAYWALL_SEEN: &str = "@instalog/paywall_seen";
    /// Widget captures not yet counted against quota by the application.
    pub const PENDING_WIDGET_CAPTURES: &str = "@instalog/pending_widget_captures";

    /// Keys owned by the process-local store.
    pub const LOCAL: &[&str] = &[
        LOGS,
        BUCKETS,
        PRESETS,
        TIER,
        TOTAL_LOG_COUNT,
        SOFT_PROMPT_SEEN,
        BADGE_SEEN,
        PAYWALL_SEEN,
    ];

    /// User content erased by a data wipe. Entitlement and quota records
    /// belong to the purchase subsystem and are never wiped.
    pub const USER_DATA: &[&str] = &[LOGS, BUCKETS, PRESETS];

    /// Keys living in the shared container.
    pub const SHARED: &[&str] = &[LOGS, PRESETS, PENDING_WIDGET_CAPTURES];
}

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable at {path}: {reason}")]
    Unavailable { path: PathBuf, reason: String },
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not encode value: {0}")]
    EncodeError(#[from] serde_json::Error),
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// The minimal key-value contract shared by both stores.
pub trait KvStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn write(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    fn clear(&mut self, keys: &[&str]) -> Result<(), StoreError>;

    /// Read and decode a collection, keeping the raw payload if it was malformed.
    fn load<T: DeserializeOwned>(&self, key: &str) -> Loaded<T> {
        let raw = match self.read(key) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key, error = %e, "read failed, treating collection as empty");
                None
            }
        };
        let Some(raw) = raw else {
            return Loaded::empty(key);
        };
        match parse::try_decode(&raw) {
            Ok(items) => Loaded {
                key: key.to_string(),
                items,
                discarded: None,
            },
            Err(error) => {
                tracing::warn!(key, %error, "undecodable payload, treating collection as empty");
                Loaded {
                    key: key.to_string(),
                    items: Vec::new(),
                    discarded: Some((raw, error)),
                }
            }
        }
    }

    fn write_collection<T: Serialize>(&mut self, key: &str, items: &[T]) -> Result<(), StoreError> {
        let payload = parse::encode(items)?;
        self.write(key, &payload)
    }

    /// A `true` flag; anything else (including absent) is false.
    fn read_flag(&self, key: &str) -> bool {
        matches!(self.read(key), Ok(Some(v)) if v.trim() == "true")
    }

    /// A decimal counter; `None` if absent or unreadable.
    fn read_u64(&self, key: &str) -> Option<u64> {
        match self.read(key) {
            Ok(Some(v)) => match v.trim().parse() {
                Ok(n) => Some(n),
                Err(_) => {
                    tracing::warn!(key, value = %v, "ignoring malformed counter");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "counter read failed");
                None
            }
        }
    }
}

/// A decoded collection plus the raw payload it replaced, if any.
#[derive(Debug)]
pub struct Loaded<T> {
    pub key: String,
    pub items: Vec<T>,
    pub discarded: Option<(String, DecodeError)>,
}

impl<T> Loaded<T> {
    fn empty(key: &str) -> Self {
        Loaded {
            key: key.to_string(),
            items: Vec::new(),
            discarded: None,
        }
    }

    /// Take the items, first copying any discarded payload to the recovery
    /// log in `recovery_dir` so it survives being overwritten.
    pub fn salvage(self, recovery_dir: &Path, origin: &str) -> Vec<T> {
        if let Some((raw, error)) = self.discarded {
            recovery::log_recovery(
                recovery_dir,
                RecoveryEntry::new(RecoveryCategory::Decode, "payload replaced")
                    .field("Key", self.key.as_str())
                    .field("Store", origin)
                    .field("Error", error.to_string())
                    .body(raw),
            );
        }
        self.items
    }
}

/// File name for a key: `@instalog/logs` becomes `instalog.logs`.
pub fn key_file_name(key: &str) -> String {
    key.trim_start_matches('@').replace('/', ".")
}

/// One file per key in a directory, written atomically.
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    /// Open (creating if needed) the directory backing a store.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir).map_err(|e| StoreError::Unavailable {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(DirStore {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(key_file_name(key))
    }

    pub(crate) fn read_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.key_path(key);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::ReadError { path, source: e }),
        }
    }

    pub(crate) fn write_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.key_path(key);
        recovery::atomic_write(&path, value.as_bytes())
            .map_err(|e| StoreError::WriteError { path, source: e })
    }

    pub(crate) fn remove_raw(&self, key: &str) -> Result<(), StoreError> {
        let path = self.key_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::WriteError { path, source: e }),
        }
    }
}

impl KvStore for DirStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.read_raw(key)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.write_raw(key, value)
    }

    fn clear(&mut self, keys: &[&str]) -> Result<(), StoreError> {
        for key in keys {
            self.remove_raw(key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::bucket::Bucket;
    use tempfile::TempDir;

    #[test]
    fn key_file_names() {
        assert_eq!(key_file_name(keys::LOGS), "instalog.logs");
        assert_eq!(
            key_file_name(keys::PENDING_WIDGET_CAPTURES),
            "instalog.pending_widget_captures"
        );
    }

    #[test]
    fn dir_store_read_write_clear() {
        let tmp = TempDir::new().unwrap();
        let mut store = DirStore::open(&tmp.path().join("store")).unwrap();

        assert_eq!(store.read(keys::TIER).unwrap(), None);
        store.write(keys::TIER, "pro").unwrap();
        assert_eq!(store.read(keys::TIER).unwrap().as_deref(), Some("pro"));
        assert!(store.key_path(keys::TIER).exists());

        store.clear(&[keys::TIER, keys::BUCKETS]).unwrap();
        assert_eq!(store.read(keys::TIER).unwrap(), None);
    }

    #[test]
    fn load_reports_discarded_payload() {
        let tmp = TempDir::new().unwrap();
        let mut store = DirStore::open(tmp.path()).unwrap();
        store.write(keys::BUCKETS, "not json {{{").unwrap();

        let loaded: Loaded<Bucket> = store.load(keys::BUCKETS);
        assert!(loaded.items.is_empty());
        assert!(loaded.discarded.is_some());

        let items = loaded.salvage(tmp.path(), "local");
        assert!(items.is_empty());
        let entries = recovery::read_recovery_entries(tmp.path(), None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].body, "not json {{{");
    }

    #[test]
    fn load_missing_key_is_empty_without_discard() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::open(tmp.path()).unwrap();
        let loaded: Loaded<Bucket> = store.load(keys::BUCKETS);
        assert!(loaded.items.is_empty());
        assert!(loaded.discarded.is_none());
    }

    #[test]
    fn flags_and_counters() {
        let tmp = TempDir::new().unwrap();
        let mut store = DirStore::open(tmp.path()).unwrap();
        assert!(!store.read_flag(keys::BADGE_SEEN));
        store.write(keys::BADGE_SEEN, "true").unwrap();
        assert!(store.read_flag(keys::BADGE_SEEN));

        assert_eq!(store.read_u64(keys::TOTAL_LOG_COUNT), None);
        store.write(keys::TOTAL_LOG_COUNT, "12").unwrap();
        assert_eq!(store.read_u64(keys::TOTAL_LOG_COUNT), Some(12));
        store.write(keys::TOTAL_LOG_COUNT, "twelve").unwrap();
        assert_eq!(store.read_u64(keys::TOTAL_LOG_COUNT), None);
    }

    #[test]
    fn open_fails_when_path_is_a_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("occupied");
        fs::write(&file, "x").unwrap();
        assert!(matches!(
            DirStore::open(&file),
            Err(StoreError::Unavailable { .. })
        ));
    }
}
