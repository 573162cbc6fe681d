use uuid::Uuid;

use crate::io::store::{KvStore, StoreError, keys};
use crate::model::bucket::{Bucket, WidgetPreset, default_icon};
use crate::ops::log_ops::MutationOutcome;

/// Error type for bucket and preset operations
#[derive(Debug, thiserror::Error)]
pub enum BucketError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("bucket not found: {0}")]
    UnknownBucket(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn clean_name(name: &str) -> Result<String, BucketError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(BucketError::EmptyName);
    }
    Ok(trimmed.to_string())
}

pub fn load_buckets<S: KvStore>(store: &S) -> Vec<Bucket> {
    store.load(keys::BUCKETS).items
}

/// Create a bucket. Capacity is the caller's check (see the quota gate).
pub fn add_bucket<S: KvStore>(store: &mut S, name: &str) -> Result<Bucket, BucketError> {
    let name = clean_name(name)?;
    let mut buckets = load_buckets(store);
    let bucket = Bucket { id: new_id(), name };
    buckets.push(bucket.clone());
    store.write_collection(keys::BUCKETS, &buckets)?;
    Ok(bucket)
}

pub fn rename_bucket<S: KvStore>(
    store: &mut S,
    id: &str,
    name: &str,
) -> Result<MutationOutcome, BucketError> {
    let name = clean_name(name)?;
    let mut buckets = load_buckets(store);
    let Some(bucket) = buckets.iter_mut().find(|b| b.id == id) else {
        return Ok(MutationOutcome::NotFound);
    };
    bucket.name = name;
    store.write_collection(keys::BUCKETS, &buckets)?;
    Ok(MutationOutcome::Applied)
}

/// Remove a bucket. Logs that reference it keep the (now orphaned) id.
pub fn remove_bucket<S: KvStore>(store: &mut S, id: &str) -> Result<MutationOutcome, StoreError> {
    let mut buckets = load_buckets(store);
    let before = buckets.len();
    buckets.retain(|b| b.id != id);
    if buckets.len() == before {
        return Ok(MutationOutcome::NotFound);
    }
    store.write_collection(keys::BUCKETS, &buckets)?;
    Ok(MutationOutcome::Applied)
}

// ---------------------------------------------------------------------------
// Widget presets
// ---------------------------------------------------------------------------

pub fn load_presets<S: KvStore>(store: &S) -> Vec<WidgetPreset> {
    store.load(keys::PRESETS).items
}

/// Build the preset list with one more entry. Nothing is written.
pub fn with_new_preset(
    mut presets: Vec<WidgetPreset>,
    label: &str,
    text: &str,
    icon: Option<&str>,
    bucket_id: Option<&str>,
) -> Result<(Vec<WidgetPreset>, WidgetPreset), BucketError> {
    let label = clean_name(label)?;
    let preset = WidgetPreset {
        id: new_id(),
        label,
        text: text.to_string(),
        icon: icon.map(str::to_string).unwrap_or_else(default_icon),
        bucket_id: bucket_id.map(str::to_string),
    };
    presets.push(preset.clone());
    Ok((presets, preset))
}

/// Build the preset list without `id`, or `None` if it is not there.
pub fn without_preset(mut presets: Vec<WidgetPreset>, id: &str) -> Option<Vec<WidgetPreset>> {
    let before = presets.len();
    presets.retain(|p| p.id != id);
    (presets.len() != before).then_some(presets)
}
