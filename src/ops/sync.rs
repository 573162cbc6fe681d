//! Reconciliation of the application's log collection with the copy in the
//! shared container.
//!
//! The merge is a union by log id. When both sides hold the same id, the
//! application's copy wins: only the application mutates logs after capture,
//! so its version of the bucket state is the newest one. This is a fixed
//! precedence rule, not a general conflict-free merge.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Serialize;

use crate::io::local_store::LocalStore;
use crate::io::shared_store::SharedStore;
use crate::io::store::{KvStore, StoreError, keys};
use crate::model::log::LogEntry;
use crate::ops::log_ops::apply_retention;
use crate::parse;

/// What one reconciliation did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Logs in the application's copy before merging.
    pub local: usize,
    /// Logs in the shared copy before merging.
    pub shared: usize,
    /// Logs in the canonical collection afterwards.
    pub merged: usize,
    /// Ids that were only in the shared copy.
    pub imported: usize,
    /// Widget captures drained from the shared counter, still to be recorded
    /// against quota by the caller.
    pub widget_captures: u64,
    pub shared_available: bool,
}

/// Union `local` and `shared` by id, local copy winning, in canonical order.
pub fn merge(local: Vec<LogEntry>, shared: Vec<LogEntry>) -> Vec<LogEntry> {
    let mut by_id: HashMap<String, LogEntry> = HashMap::with_capacity(local.len() + shared.len());
    for entry in shared {
        by_id.insert(entry.id.clone(), entry);
    }
    for entry in local {
        by_id.insert(entry.id.clone(), entry);
    }
    let mut merged: Vec<LogEntry> = by_id.into_values().collect();
    merged.sort_by(LogEntry::storage_order);
    merged
}

/// Merge the shared copy into the local store, then write the identical
/// merged collection to both sides.
///
/// Undecodable payloads count as empty (and are copied to the recovery log
/// in `recovery_dir`). Without a shared store, or if its lock cannot be taken,
/// the local copy is normalized on its own.
pub fn reconcile(
    local: &mut LocalStore,
    shared: Option<&SharedStore>,
    retention: usize,
    recovery_dir: &Path,
) -> ReconcileReport {
    let local_logs: Vec<LogEntry> = local.load(keys::LOGS).salvage(recovery_dir, "local");

    if let Some(shared) = shared {
        match reconcile_with_shared(local, shared, local_logs.clone(), retention, recovery_dir) {
            Ok(report) => return report,
            Err(e) => {
                tracing::warn!(error = %e, "shared container unavailable, reconciling locally");
            }
        }
    }

    let count = local_logs.len();
    let merged = normalize(merge(local_logs, Vec::new()), retention);
    let report = ReconcileReport {
        local: count,
        shared: 0,
        merged: merged.len(),
        imported: 0,
        widget_captures: 0,
        shared_available: false,
    };
    if let Err(e) = write_merged(local, &merged) {
        tracing::warn!(error = %e, "could not store merged collection");
    }
    report
}

fn reconcile_with_shared(
    local: &mut LocalStore,
    shared: &SharedStore,
    local_logs: Vec<LogEntry>,
    retention: usize,
    recovery_dir: &Path,
) -> Result<ReconcileReport, StoreError> {
    let mut txn = shared.lock()?;
    let shared_logs: Vec<LogEntry> = txn.load(keys::LOGS).salvage(recovery_dir, "shared");
    let widget_captures = txn.read_u64(keys::PENDING_WIDGET_CAPTURES).unwrap_or(0);

    let imported = {
        let local_ids: HashSet<&str> = local_logs.iter().map(|l| l.id.as_str()).collect();
        shared_logs
            .iter()
            .filter(|l| !local_ids.contains(l.id.as_str()))
            .map(|l| l.id.as_str())
            .collect::<HashSet<_>>()
            .len()
    };

    let report_local = local_logs.len();
    let report_shared = shared_logs.len();
    let merged = normalize(merge(local_logs, shared_logs), retention);
    let payload = parse::encode_logs(&merged)?;

    txn.write(keys::LOGS, &payload)?;
    if widget_captures > 0 {
        txn.clear(&[keys::PENDING_WIDGET_CAPTURES])?;
    }
    drop(txn);

    local.write(keys::LOGS, &payload)?;

    tracing::debug!(
        local = report_local,
        shared = report_shared,
        merged = merged.len(),
        imported,
        widget_captures,
        "reconciled"
    );

    Ok(ReconcileReport {
        local: report_local,
        shared: report_shared,
        merged: merged.len(),
        imported,
        widget_captures,
        shared_available: true,
    })
}

fn normalize(mut merged: Vec<LogEntry>, retention: usize) -> Vec<LogEntry> {
    apply_retention(&mut merged, retention);
    merged
}

fn write_merged(local: &mut LocalStore, merged: &[LogEntry]) -> Result<(), StoreError> {
    local.write_collection(keys::LOGS, merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::refresh::NoRefresh;
    use crate::model::log::BucketRef;
    use chrono::{DateTime, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn log(id: &str, ts: &str, bucket: BucketRef) -> LogEntry {
        let timestamp = ts.parse::<DateTime<Utc>>().unwrap();
        LogEntry {
            id: id.into(),
            timestamp,
            text: None,
            bucket,
            date_key: timestamp.date_naive(),
        }
    }

    fn ids(logs: &[LogEntry]) -> Vec<&str> {
        logs.iter().map(|l| l.id.as_str()).collect()
    }

    struct Stores {
        _tmp: TempDir,
        local: LocalStore,
        shared: SharedStore,
    }

    fn stores() -> Stores {
        let tmp = TempDir::new().unwrap();
        let local = LocalStore::open(&tmp.path().join("app"), Arc::new(NoRefresh)).unwrap();
        let shared = SharedStore::open(&tmp.path().join("shared"), Arc::new(NoRefresh)).unwrap();
        Stores {
            _tmp: tmp,
            local,
            shared,
        }
    }

    #[test]
    fn merge_is_union_sorted_by_timestamp() {
        let local = vec![
            log("l2", "2025-03-01T12:00:00Z", BucketRef::Unsorted),
            log("l1", "2025-03-01T08:00:00Z", BucketRef::Unsorted),
        ];
        let shared = vec![log("w1", "2025-03-01T10:00:00Z", BucketRef::Unsorted)];
        let merged = merge(local, shared);
        assert_eq!(ids(&merged), vec!["l1", "w1", "l2"]);
    }

    #[test]
    fn merge_local_copy_wins() {
        let local = vec![log("x", "2025-03-01T08:00:00Z", BucketRef::InBucket("b1".into()))];
        let shared = vec![log("x", "2025-03-01T08:00:00Z", BucketRef::Unsorted)];
        let merged = merge(local, shared);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].bucket, BucketRef::InBucket("b1".into()));
    }

    #[test]
    fn merge_equal_timestamps_ordered_by_id() {
        let local = vec![log("b", "2025-03-01T08:00:00Z", BucketRef::Unsorted)];
        let shared = vec![log("a", "2025-03-01T08:00:00Z", BucketRef::Unsorted)];
        assert_eq!(ids(&merge(local, shared)), vec!["a", "b"]);
    }

    #[test]
    fn reconcile_converges_both_stores() {
        let mut s = stores();
        s.local
            .write_collection(keys::LOGS, &[log("l1", "2025-03-01T08:00:00Z", BucketRef::Unsorted)])
            .unwrap();
        s.shared
            .write_collection(keys::LOGS, &[log("w1", "2025-03-01T09:00:00Z", BucketRef::Unsorted)])
            .unwrap();

        let dir = s.local.dir().to_path_buf();
        let report = reconcile(&mut s.local, Some(&s.shared), 1000, &dir);
        assert_eq!(report.merged, 2);
        assert_eq!(report.imported, 1);
        assert!(report.shared_available);

        let local_raw = s.local.read(keys::LOGS).unwrap().unwrap();
        let shared_raw = s.shared.read(keys::LOGS).unwrap().unwrap();
        assert_eq!(local_raw, shared_raw);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut s = stores();
        s.local
            .write_collection(keys::LOGS, &[log("l1", "2025-03-01T08:00:00Z", BucketRef::Archived)])
            .unwrap();
        s.shared
            .write_collection(keys::LOGS, &[log("w1", "2025-03-01T07:00:00Z", BucketRef::Unsorted)])
            .unwrap();
        let dir = s.local.dir().to_path_buf();

        reconcile(&mut s.local, Some(&s.shared), 1000, &dir);
        let first = s.local.read(keys::LOGS).unwrap();
        let second_report = reconcile(&mut s.local, Some(&s.shared), 1000, &dir);
        let second = s.local.read(keys::LOGS).unwrap();

        assert_eq!(first, second);
        assert_eq!(second_report.imported, 0);
    }

    #[test]
    fn undecodable_shared_payload_is_empty_side() {
        let mut s = stores();
        s.local
            .write_collection(keys::LOGS, &[log("l1", "2025-03-01T08:00:00Z", BucketRef::Unsorted)])
            .unwrap();
        s.shared.write(keys::LOGS, "{corrupt").unwrap();
        let dir = s.local.dir().to_path_buf();

        let report = reconcile(&mut s.local, Some(&s.shared), 1000, &dir);
        assert_eq!(report.merged, 1);
        assert_eq!(report.shared, 0);
        let entries = crate::io::recovery::read_recovery_entries(&dir, None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].body, "{corrupt");
    }

    #[test]
    fn drains_widget_capture_counter() {
        let mut s = stores();
        s.shared.write(keys::PENDING_WIDGET_CAPTURES, "3").unwrap();
        let dir = s.local.dir().to_path_buf();

        let report = reconcile(&mut s.local, Some(&s.shared), 1000, &dir);
        assert_eq!(report.widget_captures, 3);
        assert_eq!(s.shared.read(keys::PENDING_WIDGET_CAPTURES).unwrap(), None);

        let again = reconcile(&mut s.local, Some(&s.shared), 1000, &dir);
        assert_eq!(again.widget_captures, 0);
    }

    #[test]
    fn without_shared_store_local_is_normalized() {
        let mut s = stores();
        s.local
            .write_collection(
                keys::LOGS,
                &[
                    log("b", "2025-03-01T09:00:00Z", BucketRef::Unsorted),
                    log("a", "2025-03-01T08:00:00Z", BucketRef::Unsorted),
                ],
            )
            .unwrap();
        let dir = s.local.dir().to_path_buf();
        let report = reconcile(&mut s.local, None, 1000, &dir);
        assert!(!report.shared_available);
        let logs: Vec<LogEntry> = s.local.load(keys::LOGS).items;
        assert_eq!(ids(&logs), vec!["a", "b"]);
    }

    #[test]
    fn retention_applies_after_merge() {
        let mut s = stores();
        s.local
            .write_collection(
                keys::LOGS,
                &[
                    log("l1", "2025-03-01T08:00:00Z", BucketRef::Unsorted),
                    log("l2", "2025-03-01T10:00:00Z", BucketRef::Unsorted),
                ],
            )
            .unwrap();
        s.shared
            .write_collection(keys::LOGS, &[log("w1", "2025-03-01T09:00:00Z", BucketRef::Unsorted)])
            .unwrap();
        let dir = s.local.dir().to_path_buf();
        reconcile(&mut s.local, Some(&s.shared), 2, &dir);
        let logs: Vec<LogEntry> = s.local.load(keys::LOGS).items;
        assert_eq!(ids(&logs), vec!["w1", "l2"]);
    }
}
