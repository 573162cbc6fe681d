use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Wire value that marks a log as archived in the `bucketId` field.
pub const ARCHIVED_SENTINEL: &str = "__archived__";

/// Where a log currently sits in the sorting flow.
///
/// On the wire this is the nullable `bucketId` string: `null` for unsorted,
/// the archive sentinel for archived, anything else is a bucket id. Bucket
/// ids are never validated against the bucket list, so a reference to a
/// removed bucket stays a plain `InBucket`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum BucketRef {
    #[default]
    Unsorted,
    Archived,
    InBucket(String),
}

impl BucketRef {
    pub fn is_unsorted(&self) -> bool {
        matches!(self, BucketRef::Unsorted)
    }

    pub fn is_archived(&self) -> bool {
        matches!(self, BucketRef::Archived)
    }

    /// The bucket id, if the log is sorted into a bucket.
    pub fn bucket_id(&self) -> Option<&str> {
        match self {
            BucketRef::InBucket(id) => Some(id),
            _ => None,
        }
    }

    /// Parse a user-supplied bucket argument (the sentinel is accepted too).
    pub fn from_wire(value: Option<&str>) -> Self {
        Self::from(value.map(str::to_string))
    }
}

impl From<Option<String>> for BucketRef {
    fn from(value: Option<String>) -> Self {
        match value {
            None => BucketRef::Unsorted,
            Some(s) if s == ARCHIVED_SENTINEL => BucketRef::Archived,
            Some(s) => BucketRef::InBucket(s),
        }
    }
}

impl From<BucketRef> for Option<String> {
    fn from(value: BucketRef) -> Self {
        match value {
            BucketRef::Unsorted => None,
            BucketRef::Archived => Some(ARCHIVED_SENTINEL.to_string()),
            BucketRef::InBucket(id) => Some(id),
        }
    }
}

/// A single captured log.
///
/// Everything except `bucket` is fixed at capture time. `date_key` is the
/// local calendar day at the moment of capture and is never recomputed from
/// `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    #[serde(with = "rfc3339_utc")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(rename = "bucketId", default)]
    pub bucket: BucketRef,
    pub date_key: NaiveDate,
}

impl LogEntry {
    /// Canonical storage order: timestamp ascending, id as tie-break.
    pub fn storage_order(a: &LogEntry, b: &LogEntry) -> std::cmp::Ordering {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// RFC 3339 in UTC with a `Z` suffix and only as many fractional digits as
/// the value needs, so encoding is lossless at nanosecond precision.
mod rfc3339_utc {
    use super::*;

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_ref_from_wire_values() {
        assert_eq!(BucketRef::from(None), BucketRef::Unsorted);
        assert_eq!(
            BucketRef::from(Some(ARCHIVED_SENTINEL.to_string())),
            BucketRef::Archived
        );
        assert_eq!(
            BucketRef::from(Some("b1".to_string())),
            BucketRef::InBucket("b1".into())
        );
    }

    #[test]
    fn bucket_ref_accessors() {
        assert!(BucketRef::Unsorted.is_unsorted());
        assert!(BucketRef::Archived.is_archived());
        assert_eq!(BucketRef::InBucket("b".into()).bucket_id(), Some("b"));
        assert_eq!(BucketRef::Archived.bucket_id(), None);
    }

    #[test]
    fn timestamp_accepts_offsets_and_normalizes_to_utc() {
        let entry: LogEntry = serde_json::from_str(
            r#"{"id":"a","timestamp":"2025-03-01T23:59:00-05:00","dateKey":"2025-03-01"}"#,
        )
        .unwrap();
        assert_eq!(
            entry.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            "2025-03-02T04:59:00Z"
        );
        // dateKey is taken as written, never derived from the timestamp
        assert_eq!(entry.date_key.to_string(), "2025-03-01");
    }

    #[test]
    fn timestamp_keeps_fractional_seconds() {
        let entry: LogEntry = serde_json::from_str(
            r#"{"id":"a","timestamp":"2025-01-10T08:00:00.123Z","dateKey":"2025-01-10"}"#,
        )
        .unwrap();
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains(r#""timestamp":"2025-01-10T08:00:00.123Z""#));
    }

    #[test]
    fn storage_order_breaks_ties_by_id() {
        let ts = "2025-01-10T08:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        let a = LogEntry {
            id: "a".into(),
            timestamp: ts,
            text: None,
            bucket: BucketRef::Unsorted,
            date_key: day,
        };
        let b = LogEntry {
            id: "b".into(),
            ..a.clone()
        };
        assert_eq!(LogEntry::storage_order(&a, &b), std::cmp::Ordering::Less);
    }
}
