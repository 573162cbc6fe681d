//! Append-only recovery log.
//!
//! Anything instalog had to drop on the floor (an undecodable payload, a
//! write that never reached disk, a deleted log) is appended here as a
//! markdown block, so a user can dig it back out by hand:
//!
//! ````text
//! ## 2025-03-01T09:15:00Z | decode: payload replaced
//!
//! Key: @instalog/logs
//!
//! ```text
//! {{{ not json
//! ```
//!
//! ---
//! ````

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use tempfile::NamedTempFile;

const LOG_FILE: &str = ".recovery.log";

/// Rotate to `.recovery.log.1` once the log grows past this many bytes.
const ROTATE_AT: u64 = 1 << 20;

const PREAMBLE: &str = "\
<!-- instalog recovery log: append-only
     Payloads instalog could not store or had to replace are kept here.
     If a log went missing, check here.
     View with: il recovery
     Safe to delete if empty or stale. -->

---
";

const FENCE_OPEN: &str = "```text";
const FENCE_CLOSE: &str = "```";
const SEPARATOR: &str = "---";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryCategory {
    /// A persisted payload could not be decoded and was replaced.
    Decode,
    /// A durable write failed; the body is the value that was not written.
    Write,
    /// A log was deleted by the user.
    Delete,
}

impl RecoveryCategory {
    fn as_str(self) -> &'static str {
        match self {
            RecoveryCategory::Decode => "decode",
            RecoveryCategory::Write => "write",
            RecoveryCategory::Delete => "delete",
        }
    }
}

impl fmt::Display for RecoveryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecoveryCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        [
            RecoveryCategory::Decode,
            RecoveryCategory::Write,
            RecoveryCategory::Delete,
        ]
        .into_iter()
        .find(|c| c.as_str() == s)
        .ok_or(())
    }
}

#[derive(Debug, Clone)]
pub struct RecoveryEntry {
    pub timestamp: DateTime<Utc>,
    pub category: RecoveryCategory,
    pub description: String,
    /// `Key: value` lines, in the order they were added.
    pub fields: Vec<(String, String)>,
    /// The raw payload, if any. Written inside a fenced block.
    pub body: String,
}

impl RecoveryEntry {
    pub fn new(category: RecoveryCategory, description: impl Into<String>) -> Self {
        RecoveryEntry {
            timestamp: Utc::now(),
            category,
            description: description.into(),
            fields: Vec::new(),
            body: String::new(),
        }
    }

    pub fn field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.push((key.to_string(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Parse the text after `## `: `<timestamp> | <category>: <description>`.
    fn from_header(header: &str) -> Option<Self> {
        let (stamp, rest) = header.split_once(" | ")?;
        let (category, description) = rest.split_once(": ")?;
        Some(RecoveryEntry {
            timestamp: DateTime::parse_from_rfc3339(stamp).ok()?.with_timezone(&Utc),
            category: category.parse().ok()?,
            description: description.to_string(),
            fields: Vec::new(),
            body: String::new(),
        })
    }
}

/// Renders the entry as one markdown block, separator included.
impl fmt::Display for RecoveryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "## {} | {}: {}\n",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.category,
            self.description
        )?;
        for (key, value) in &self.fields {
            writeln!(f, "{}: {}", key, value)?;
        }
        if !self.body.is_empty() {
            writeln!(f, "\n{}", FENCE_OPEN)?;
            f.write_str(&self.body)?;
            if !self.body.ends_with('\n') {
                f.write_str("\n")?;
            }
            writeln!(f, "{}", FENCE_CLOSE)?;
        }
        writeln!(f, "\n{}", SEPARATOR)
    }
}

pub fn recovery_log_path(dir: &Path) -> PathBuf {
    dir.join(LOG_FILE)
}

/// Replace `path` with `content` via a synced temp file in the same directory.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let mut staged = NamedTempFile::new_in(parent)?;
    staged.write_all(content)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Append `entry` to the recovery log in `dir`.
///
/// Never fails: the recovery log is the last resort, so a failure here is
/// only reported through tracing.
pub fn log_recovery(dir: &Path, entry: RecoveryEntry) {
    if let Err(e) = append(&recovery_log_path(dir), &entry) {
        tracing::warn!(error = %e, category = %entry.category, "could not write to recovery log");
    }
}

fn append(path: &Path, entry: &RecoveryEntry) -> io::Result<()> {
    let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let fresh = if size > ROTATE_AT {
        fs::rename(path, path.with_extension("log.1"))?;
        true
    } else {
        size == 0
    };

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut block = if fresh { PREAMBLE.to_string() } else { String::new() };
    block.push_str(&entry.to_string());
    file.write_all(block.as_bytes())
}

/// Entries from the recovery log in `dir`, newest first, at most `limit`.
pub fn read_recovery_entries(dir: &Path, limit: Option<usize>) -> Vec<RecoveryEntry> {
    let Ok(content) = fs::read_to_string(recovery_log_path(dir)) else {
        return Vec::new();
    };
    let mut entries = parse_log(&content);
    entries.reverse();
    if let Some(n) = limit {
        entries.truncate(n);
    }
    entries
}

enum Section {
    /// Between blocks, waiting for a `## ` header.
    Outside,
    Fields,
    Body,
}

fn parse_log(content: &str) -> Vec<RecoveryEntry> {
    let mut entries = Vec::new();
    let mut current: Option<RecoveryEntry> = None;
    let mut section = Section::Outside;

    for line in content.lines() {
        match section {
            Section::Outside => {
                if let Some(entry) = line.strip_prefix("## ").and_then(RecoveryEntry::from_header) {
                    current = Some(entry);
                    section = Section::Fields;
                }
            }
            Section::Fields => {
                if line == SEPARATOR {
                    entries.extend(current.take());
                    section = Section::Outside;
                } else if line.starts_with(FENCE_CLOSE) {
                    section = Section::Body;
                } else if let Some((key, value)) = line.trim().split_once(": ")
                    && let Some(entry) = current.as_mut()
                {
                    entry.fields.push((key.to_string(), value.to_string()));
                }
            }
            Section::Body => {
                if line == FENCE_CLOSE {
                    section = Section::Fields;
                } else if let Some(entry) = current.as_mut() {
                    if !entry.body.is_empty() {
                        entry.body.push('\n');
                    }
                    entry.body.push_str(line);
                }
            }
        }
    }
    // A block cut short by a crash still counts
    entries.extend(current);
    entries
}
