use std::collections::BTreeMap;

use chrono::{Local, NaiveDate, SecondsFormat};
use serde::Serialize;

use crate::io::recovery::RecoveryEntry;
use crate::model::bucket::{Bucket, WidgetPreset};
use crate::model::entitlement::Remaining;
use crate::model::log::{BucketRef, LogEntry};
use crate::ops::quota::{Nudges, QuotaGate};

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct CaptureJson<'a> {
    pub log: &'a LogEntry,
    pub remaining: Option<u64>,
    pub nudges: Nudges,
}

#[derive(Serialize)]
pub struct QuotaJson {
    pub tier: String,
    pub total_log_count: u64,
    /// `null` when unlimited
    pub remaining: Option<u64>,
    pub can_create_log: bool,
    pub soft_prompt_seen: bool,
    pub badge_seen: bool,
    pub paywall_seen: bool,
    pub show_soft_prompt: bool,
    pub show_badge: bool,
}

#[derive(Serialize)]
pub struct DayCountJson {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Serialize)]
pub struct RecoveryEntryJson {
    /// `app` or `widget`: which process wrote the entry.
    pub store: &'static str,
    pub timestamp: String,
    pub category: String,
    pub description: String,
    pub fields: BTreeMap<String, String>,
    pub body: String,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

pub fn remaining_to_json(remaining: Remaining) -> Option<u64> {
    match remaining {
        Remaining::Unbounded => None,
        Remaining::Count(n) => Some(n),
    }
}

pub fn quota_to_json(gate: &QuotaGate) -> QuotaJson {
    let state = gate.state();
    QuotaJson {
        tier: state.tier.to_string(),
        total_log_count: state.total_log_count,
        remaining: remaining_to_json(gate.logs_remaining()),
        can_create_log: gate.can_create_log(),
        soft_prompt_seen: state.soft_prompt_seen,
        badge_seen: state.badge_seen,
        paywall_seen: state.paywall_seen,
        show_soft_prompt: gate.should_show_soft_prompt(),
        show_badge: gate.should_show_badge(),
    }
}

pub fn daily_counts_to_json(counts: &BTreeMap<NaiveDate, usize>) -> Vec<DayCountJson> {
    counts
        .iter()
        .map(|(date, count)| DayCountJson {
            date: *date,
            count: *count,
        })
        .collect()
}

pub fn recovery_to_json(store: &'static str, entry: &RecoveryEntry) -> RecoveryEntryJson {
    RecoveryEntryJson {
        store,
        timestamp: entry.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        category: entry.category.to_string(),
        description: entry.description.clone(),
        fields: entry.fields.iter().cloned().collect(),
        body: entry.body.clone(),
    }
}

// ---------------------------------------------------------------------------
// Human-readable formatting
// ---------------------------------------------------------------------------

fn bucket_label(bucket: &BucketRef, buckets: &[Bucket]) -> String {
    match bucket {
        BucketRef::Unsorted => "unsorted".to_string(),
        BucketRef::Archived => "archived".to_string(),
        BucketRef::InBucket(id) => match buckets.iter().find(|b| &b.id == id) {
            Some(b) => format!("@{}", b.name),
            None => format!("@{} (removed)", id),
        },
    }
}

/// Format a single log as a one-line summary, in local time
pub fn format_log_line(log: &LogEntry, buckets: &[Bucket]) -> String {
    let local = log.timestamp.with_timezone(&Local);
    let text = log.text.as_deref().unwrap_or("");
    let line = format!(
        "{}  {}  [{}]",
        log.id,
        local.format("%Y-%m-%d %H:%M"),
        bucket_label(&log.bucket, buckets)
    );
    if text.is_empty() {
        line
    } else {
        format!("{}  {}", line, text)
    }
}

pub fn format_capture(log: &LogEntry) -> String {
    format!(
        "logged {} at {}",
        log.id,
        log.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

pub fn format_quota(gate: &QuotaGate) -> Vec<String> {
    let state = gate.state();
    let mut lines = vec![
        format!("tier: {}", state.tier),
        format!("logs: {}", state.total_log_count),
        format!("remaining: {}", gate.logs_remaining()),
    ];
    if !state.is_pro() {
        lines.push(format!(
            "cap: {} logs, {} buckets, {} presets",
            gate.limits().free_log_cap,
            gate.limits().free_bucket_cap,
            gate.limits().free_preset_cap
        ));
    }
    let seen: Vec<&str> = [
        (state.soft_prompt_seen, "soft-prompt"),
        (state.badge_seen, "badge"),
        (state.paywall_seen, "paywall"),
    ]
    .iter()
    .filter(|(seen, _)| *seen)
    .map(|(_, name)| *name)
    .collect();
    if !seen.is_empty() {
        lines.push(format!("seen: {}", seen.join(", ")));
    }
    lines
}

pub fn format_nudges(nudges: Nudges, remaining: Remaining) -> Vec<String> {
    let mut lines = Vec::new();
    if nudges.soft_prompt {
        lines.push(format!("tip: {} free logs left, upgrade any time", remaining));
    }
    if nudges.badge {
        lines.push(format!("only {} free logs left", remaining));
    }
    lines
}

pub fn format_bucket_line(bucket: &Bucket) -> String {
    format!("{}  {}", bucket.id, bucket.name)
}

pub fn format_preset_line(preset: &WidgetPreset) -> String {
    let line = format!("{}  [{}] {}: {}", preset.id, preset.icon, preset.label, preset.text);
    match &preset.bucket_id {
        Some(bucket) => format!("{}  -> {}", line, bucket),
        None => line,
    }
}

pub fn format_recovery_entry(store: &str, entry: &RecoveryEntry) -> Vec<String> {
    let mut lines = vec![format!(
        "{} [{}] {}: {}",
        entry.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        store,
        entry.category,
        entry.description
    )];
    for (key, value) in &entry.fields {
        lines.push(format!("  {}: {}", key, value));
    }
    if !entry.body.is_empty() {
        for line in entry.body.lines() {
            lines.push(format!("  | {}", line));
        }
    }
    lines
}
