//! The widget extension process: sees only the shared container.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local, NaiveDate};

use crate::io::refresh::RefreshHook;
use crate::io::shared_store::SharedStore;
use crate::io::store::{KvStore, StoreError, keys};
use crate::model::bucket::WidgetPreset;
use crate::model::config::Config;
use crate::model::log::LogEntry;
use crate::ops::bucket_ops;
use crate::ops::log_ops;

/// Quick capture from outside the application.
///
/// Captures are appended to the shared copy of the collection and counted in
/// the pending-captures key, so the application can record them against quota
/// at its next reconciliation. The widget never consults the quota gate.
pub struct Extension {
    shared: Option<SharedStore>,
    retention: usize,
}

impl Extension {
    /// Open the shared container. An unavailable container is not an error:
    /// captures are then logged and dropped.
    pub fn open(shared_dir: &Path, config: &Config, hook: Arc<dyn RefreshHook>) -> Self {
        let shared = match SharedStore::open(shared_dir, hook) {
            Ok(store) => Some(store),
            Err(e) => {
                tracing::error!(error = %e, "shared container unavailable");
                None
            }
        };
        Extension {
            shared,
            retention: config.storage.retention,
        }
    }

    pub fn is_available(&self) -> bool {
        self.shared.is_some()
    }

    pub fn capture(&self, text: Option<String>) -> Option<LogEntry> {
        self.capture_at(text, Local::now().fixed_offset())
    }

    /// Append a log to the shared collection. Returns `None` if nothing
    /// could be persisted; the error is logged, never raised.
    pub fn capture_at(&self, text: Option<String>, now: DateTime<FixedOffset>) -> Option<LogEntry> {
        let shared = self.shared.as_ref()?;
        match self.append(shared, text, now) {
            Ok(entry) => {
                tracing::debug!(id = %entry.id, "widget capture stored");
                Some(entry)
            }
            Err(e) => {
                tracing::error!(error = %e, "widget capture lost");
                None
            }
        }
    }

    fn append(
        &self,
        shared: &SharedStore,
        text: Option<String>,
        now: DateTime<FixedOffset>,
    ) -> Result<LogEntry, StoreError> {
        let mut txn = shared.lock()?;
        let logs = txn.load(keys::LOGS).salvage(shared.dir(), "shared");
        let entry = log_ops::capture_into(&mut txn, logs, text, now, self.retention)?;
        txn.increment(keys::PENDING_WIDGET_CAPTURES, 1)?;
        Ok(entry)
    }

    /// Capture the text of the preset with `id`. `None` if the preset is
    /// unknown or the capture failed.
    pub fn capture_preset(&self, id: &str) -> Option<LogEntry> {
        let preset = self.presets().into_iter().find(|p| p.id == id);
        let Some(preset) = preset else {
            tracing::warn!(id, "unknown widget preset");
            return None;
        };
        let text = (!preset.text.is_empty()).then_some(preset.text);
        self.capture(text)
    }

    /// Presets published by the application.
    pub fn presets(&self) -> Vec<WidgetPreset> {
        match &self.shared {
            Some(shared) => bucket_ops::load_presets(shared),
            None => Vec::new(),
        }
    }

    /// Logs in the shared copy for today (the widget's counter).
    pub fn today_count(&self) -> usize {
        self.count_for(Local::now().date_naive())
    }

    pub fn count_for(&self, date: NaiveDate) -> usize {
        match &self.shared {
            Some(shared) => {
                let logs: Vec<LogEntry> = shared.load(keys::LOGS).items;
                log_ops::for_date(&logs, date).len()
            }
            None => 0,
        }
    }
}
