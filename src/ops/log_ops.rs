use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use uuid::Uuid;

use crate::io::store::{KvStore, StoreError, keys};
use crate::model::log::{BucketRef, LogEntry};

/// Result of mutating a log or bucket by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    /// The id no longer exists; nothing was changed.
    NotFound,
}

impl MutationOutcome {
    pub fn applied(&self) -> bool {
        matches!(self, MutationOutcome::Applied)
    }
}

/// Fresh opaque id: capture millis plus a random suffix.
pub fn generate_id(now: DateTime<FixedOffset>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", now.timestamp_millis(), &suffix[..9])
}

/// Build a new unsorted log captured at `now`.
///
/// `now` carries the local offset in effect at capture time; the date key is
/// the calendar day in that offset and is frozen from here on.
pub fn new_log(text: Option<String>, now: DateTime<FixedOffset>) -> LogEntry {
    LogEntry {
        id: generate_id(now),
        timestamp: now.with_timezone(&Utc),
        text,
        bucket: BucketRef::Unsorted,
        date_key: now.date_naive(),
    }
}

/// Append a new log to `store`'s collection and persist it.
pub fn capture_into<S: KvStore>(
    store: &mut S,
    logs: Vec<LogEntry>,
    text: Option<String>,
    now: DateTime<FixedOffset>,
    retention: usize,
) -> Result<LogEntry, StoreError> {
    let entry = new_log(text, now);
    let mut logs = logs;
    logs.push(entry.clone());
    apply_retention(&mut logs, retention);
    store.write_collection(keys::LOGS, &logs)?;
    Ok(entry)
}

/// Keep only the `retention` most recent entries of an ordered collection.
pub fn apply_retention(logs: &mut Vec<LogEntry>, retention: usize) {
    if logs.len() > retention {
        let excess = logs.len() - retention;
        logs.drain(..excess);
    }
}

/// Set the bucket state of one log.
pub fn assign_bucket<S: KvStore>(
    store: &mut S,
    logs: &mut [LogEntry],
    id: &str,
    bucket: BucketRef,
) -> Result<MutationOutcome, StoreError> {
    let Some(log) = logs.iter_mut().find(|l| l.id == id) else {
        return Ok(MutationOutcome::NotFound);
    };
    log.bucket = bucket;
    store.write_collection(keys::LOGS, logs)?;
    Ok(MutationOutcome::Applied)
}

/// Remove one log from the collection. Returns the removed entry.
pub fn remove_log<S: KvStore>(
    store: &mut S,
    logs: &mut Vec<LogEntry>,
    id: &str,
) -> Result<Option<LogEntry>, StoreError> {
    let Some(index) = logs.iter().position(|l| l.id == id) else {
        return Ok(None);
    };
    let removed = logs.remove(index);
    store.write_collection(keys::LOGS, logs)?;
    Ok(Some(removed))
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Logs still waiting to be sorted (archived and bucketed logs excluded).
pub fn unsorted(logs: &[LogEntry]) -> Vec<LogEntry> {
    logs.iter()
        .filter(|l| l.bucket.is_unsorted())
        .cloned()
        .collect()
}

pub fn for_date(logs: &[LogEntry], date: NaiveDate) -> Vec<LogEntry> {
    logs.iter().filter(|l| l.date_key == date).cloned().collect()
}

pub fn in_bucket(logs: &[LogEntry], bucket_id: &str) -> Vec<LogEntry> {
    logs.iter()
        .filter(|l| l.bucket.bucket_id() == Some(bucket_id))
        .cloned()
        .collect()
}

/// Number of logs per capture day, oldest day first.
pub fn daily_counts(logs: &[LogEntry]) -> BTreeMap<NaiveDate, usize> {
    let mut counts = BTreeMap::new();
    for log in logs {
        *counts.entry(log.date_key).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::store::DirStore;
    use crate::parse::decode_logs;
    use tempfile::TempDir;

    fn at(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn stored(store: &DirStore) -> Vec<LogEntry> {
        decode_logs(&store.read(keys::LOGS).unwrap().unwrap_or_default())
    }

    #[test]
    fn new_log_freezes_local_date() {
        // 23:59 local on March 1st is already March 2nd in UTC
        let log = new_log(None, at("2025-03-01T23:59:00-05:00"));
        assert_eq!(log.date_key, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(log.timestamp.to_rfc3339(), "2025-03-02T04:59:00+00:00");
        assert_eq!(log.bucket, BucketRef::Unsorted);
        assert_eq!(log.text, None);
    }

    #[test]
    fn ids_are_unique() {
        let now = at("2025-03-01T09:00:00Z");
        let a = generate_id(now);
        let b = generate_id(now);
        assert_ne!(a, b);
        assert!(a.starts_with(&now.timestamp_millis().to_string()));
    }

    #[test]
    fn capture_appends_and_persists() {
        let tmp = TempDir::new().unwrap();
        let mut store = DirStore::open(tmp.path()).unwrap();
        let first = capture_into(&mut store, Vec::new(), Some("a".into()), at("2025-03-01T09:00:00Z"), 10)
            .unwrap();
        let logs = stored(&store);
        let second = capture_into(&mut store, logs, None, at("2025-03-01T09:05:00Z"), 10).unwrap();

        let logs = stored(&store);
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].id, first.id);
        assert_eq!(logs[1].id, second.id);
        assert_eq!(logs[0].text.as_deref(), Some("a"));
    }

    #[test]
    fn capture_keeps_text_verbatim() {
        let tmp = TempDir::new().unwrap();
        let mut store = DirStore::open(tmp.path()).unwrap();
        let entry = capture_into(
            &mut store,
            Vec::new(),
            Some("  padded\n".into()),
            at("2025-03-01T09:00:00Z"),
            10,
        )
        .unwrap();
        assert_eq!(entry.text.as_deref(), Some("  padded\n"));
        assert_eq!(stored(&store)[0].text.as_deref(), Some("  padded\n"));
    }

    #[test]
    fn retention_drops_oldest() {
        let mut logs: Vec<LogEntry> = (0..5)
            .map(|i| new_log(Some(i.to_string()), at("2025-03-01T09:00:00Z")))
            .collect();
        apply_retention(&mut logs, 3);
        let texts: Vec<_> = logs.iter().map(|l| l.text.clone().unwrap()).collect();
        assert_eq!(texts, vec!["2", "3", "4"]);
    }

    #[test]
    fn assign_and_remove_not_found() {
        let tmp = TempDir::new().unwrap();
        let mut store = DirStore::open(tmp.path()).unwrap();
        let mut logs = vec![new_log(None, at("2025-03-01T09:00:00Z"))];
        assert_eq!(
            assign_bucket(&mut store, &mut logs, "missing", BucketRef::Archived).unwrap(),
            MutationOutcome::NotFound
        );
        assert!(remove_log(&mut store, &mut logs, "missing").unwrap().is_none());
        assert_eq!(logs.len(), 1);
        // Nothing was written
        assert_eq!(store.read(keys::LOGS).unwrap(), None);
    }

    #[test]
    fn archived_excluded_from_unsorted_only() {
        let tmp = TempDir::new().unwrap();
        let mut store = DirStore::open(tmp.path()).unwrap();
        let mut logs = vec![
            new_log(Some("x".into()), at("2025-03-01T09:00:00Z")),
            new_log(Some("y".into()), at("2025-03-01T10:00:00Z")),
        ];
        let x = logs[0].id.clone();
        let outcome = assign_bucket(&mut store, &mut logs, &x, BucketRef::Archived).unwrap();
        assert!(outcome.applied());

        let all = stored(&store);
        assert_eq!(all.len(), 2);
        let open = unsorted(&all);
        assert_eq!(open.len(), 1);
        assert_ne!(open[0].id, x);
    }

    #[test]
    fn day_views() {
        let logs = vec![
            new_log(None, at("2025-03-01T09:00:00Z")),
            new_log(None, at("2025-03-01T10:00:00Z")),
            new_log(None, at("2025-03-02T10:00:00Z")),
        ];
        let day1 = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();
        assert_eq!(for_date(&logs, day1).len(), 2);
        let counts = daily_counts(&logs);
        assert_eq!(counts.get(&day1), Some(&2));
        assert_eq!(counts.get(&day2), Some(&1));
    }

    #[test]
    fn orphaned_bucket_reference_is_readable() {
        let mut log = new_log(None, at("2025-03-01T09:00:00Z"));
        log.bucket = BucketRef::InBucket("deleted-bucket".into());
        let logs = vec![log];
        assert_eq!(in_bucket(&logs, "deleted-bucket").len(), 1);
        assert!(unsorted(&logs).is_empty());
    }
}
