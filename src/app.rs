//! The application process: owns both stores and the quota gate.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local, NaiveDate};

use crate::io::local_store::LocalStore;
use crate::io::recovery::{self, RecoveryCategory, RecoveryEntry};
use crate::io::refresh::RefreshHook;
use crate::io::shared_store::SharedStore;
use crate::io::store::{KvStore, StoreError, keys};
use crate::model::bucket::{Bucket, WidgetPreset};
use crate::model::config::Config;
use crate::model::entitlement::Remaining;
use crate::model::log::{BucketRef, LogEntry};
use crate::ops::bucket_ops::{self, BucketError};
use crate::ops::log_ops::{self, MutationOutcome};
use crate::ops::quota::{Nudges, Prompt, QuotaGate};
use crate::ops::sync::{self, ReconcileReport};

/// Where each store lives on disk.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub local_dir: PathBuf,
    pub shared_dir: PathBuf,
}

impl AppPaths {
    pub fn resolve(data_dir: &Path, config: &Config) -> Self {
        AppPaths {
            data_dir: data_dir.to_path_buf(),
            local_dir: data_dir.join("app"),
            shared_dir: config
                .storage
                .shared_dir
                .clone()
                .unwrap_or_else(|| data_dir.join("shared")),
        }
    }
}

/// The main application's view of the system.
///
/// Constructed once at process start with [`App::init`], which reconciles
/// before anything reads the collection, and torn down with [`App::close`].
pub struct App {
    config: Config,
    paths: AppPaths,
    local: LocalStore,
    shared: Option<SharedStore>,
    gate: QuotaGate,
    hook: Arc<dyn RefreshHook>,
}

impl App {
    /// Open the stores, reconcile (cold start) and load the quota gate.
    ///
    /// Only a process-local store that cannot be opened is an error; an
    /// unavailable shared container degrades to local-only operation.
    pub fn init(
        paths: AppPaths,
        config: Config,
        hook: Arc<dyn RefreshHook>,
    ) -> Result<Self, StoreError> {
        let local = LocalStore::open(&paths.local_dir, hook.clone())?;
        let shared = open_shared(&paths.shared_dir, hook.clone());
        let gate = QuotaGate::load(&local, config.limits.clone());

        let mut app = App {
            config,
            paths,
            local,
            shared,
            gate,
            hook,
        };
        app.reconcile();

        let count = app.all_logs().len();
        if let Err(e) = app.gate.seed_if_unset(&mut app.local, count) {
            tracing::warn!(error = %e, "could not seed log counter");
        }
        Ok(app)
    }

    /// Resume-from-background hook: the widget may have written while we
    /// were suspended.
    pub fn on_foreground(&mut self) -> ReconcileReport {
        self.reconcile()
    }

    /// Merge the shared copy into the canonical collection and write the
    /// result to both stores. Widget captures found in the shared counter are
    /// recorded against quota here.
    pub fn reconcile(&mut self) -> ReconcileReport {
        if self.shared.is_none() {
            self.shared = open_shared(&self.paths.shared_dir, self.hook.clone());
        }
        let report = sync::reconcile(
            &mut self.local,
            self.shared.as_ref(),
            self.config.storage.retention,
            &self.paths.local_dir,
        );
        if let Err(e) = self
            .gate
            .record_logs_created(&mut self.local, report.widget_captures)
        {
            tracing::warn!(error = %e, "could not record widget captures");
        }
        report
    }

    pub fn shared_available(&self) -> bool {
        self.shared.is_some()
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Logs
    // -----------------------------------------------------------------------

    /// Capture a log now. Does not consult the quota gate.
    pub fn capture(&mut self, text: Option<String>) -> LogEntry {
        self.capture_at(text, Local::now().fixed_offset())
    }

    pub fn capture_at(&mut self, text: Option<String>, now: DateTime<FixedOffset>) -> LogEntry {
        let logs = self.load_logs();
        match log_ops::capture_into(
            &mut self.local,
            logs,
            text.clone(),
            now,
            self.config.storage.retention,
        ) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::error!(error = %e, "capture could not be stored");
                log_ops::new_log(text, now)
            }
        }
    }

    pub fn all_logs(&self) -> Vec<LogEntry> {
        self.local.load(keys::LOGS).items
    }

    pub fn unsorted_logs(&self) -> Vec<LogEntry> {
        log_ops::unsorted(&self.all_logs())
    }

    pub fn logs_for_date(&self, date: NaiveDate) -> Vec<LogEntry> {
        log_ops::for_date(&self.all_logs(), date)
    }

    pub fn today_logs(&self) -> Vec<LogEntry> {
        self.logs_for_date(Local::now().date_naive())
    }

    pub fn logs_in_bucket(&self, bucket_id: &str) -> Vec<LogEntry> {
        log_ops::in_bucket(&self.all_logs(), bucket_id)
    }

    pub fn daily_counts(&self) -> BTreeMap<NaiveDate, usize> {
        log_ops::daily_counts(&self.all_logs())
    }

    pub fn assign_bucket(&mut self, id: &str, bucket: BucketRef) -> MutationOutcome {
        let mut logs = self.load_logs();
        match log_ops::assign_bucket(&mut self.local, &mut logs, id, bucket) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(id, error = %e, "bucket assignment not stored");
                MutationOutcome::Applied
            }
        }
    }

    /// Delete a log from the canonical collection and from the shared copy,
    /// so the next reconciliation cannot bring it back. Quota is not refunded.
    pub fn delete_log(&mut self, id: &str) -> MutationOutcome {
        let mut logs = self.load_logs();
        let removed = match log_ops::remove_log(&mut self.local, &mut logs, id) {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(id, error = %e, "deletion not stored");
                return MutationOutcome::NotFound;
            }
        };

        let shared_removed = self.delete_from_shared(id);

        match removed.or(shared_removed) {
            Some(entry) => {
                let body = serde_json::to_string(&entry).unwrap_or_default();
                recovery::log_recovery(
                    &self.paths.local_dir,
                    RecoveryEntry::new(RecoveryCategory::Delete, format!("log {} deleted", id))
                        .field("Id", id)
                        .body(body),
                );
                MutationOutcome::Applied
            }
            None => MutationOutcome::NotFound,
        }
    }

    fn delete_from_shared(&mut self, id: &str) -> Option<LogEntry> {
        let shared = self.shared.as_ref()?;
        let result = shared.lock().and_then(|mut txn| {
            let mut logs = txn.load(keys::LOGS).salvage(&self.paths.local_dir, "shared");
            log_ops::remove_log(&mut txn, &mut logs, id)
        });
        match result {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(id, error = %e, "could not remove log from shared container");
                None
            }
        }
    }

    fn load_logs(&self) -> Vec<LogEntry> {
        self.local
            .load(keys::LOGS)
            .salvage(&self.paths.local_dir, "local")
    }

    // -----------------------------------------------------------------------
    // Buckets
    // -----------------------------------------------------------------------

    pub fn buckets(&self) -> Vec<Bucket> {
        bucket_ops::load_buckets(&self.local)
    }

    /// Create a bucket. The bucket cap is the caller's check
    /// ([`App::can_create_bucket`]).
    pub fn add_bucket(&mut self, name: &str) -> Result<Bucket, BucketError> {
        bucket_ops::add_bucket(&mut self.local, name)
    }

    pub fn rename_bucket(&mut self, id: &str, name: &str) -> Result<MutationOutcome, BucketError> {
        bucket_ops::rename_bucket(&mut self.local, id, name)
    }

    pub fn remove_bucket(&mut self, id: &str) -> MutationOutcome {
        match bucket_ops::remove_bucket(&mut self.local, id) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(id, error = %e, "bucket removal not stored");
                MutationOutcome::Applied
            }
        }
    }

    // -----------------------------------------------------------------------
    // Widget presets
    // -----------------------------------------------------------------------

    pub fn presets(&self) -> Vec<WidgetPreset> {
        bucket_ops::load_presets(&self.local)
    }

    /// Create a preset and publish the list to the widget. The preset cap is
    /// the caller's check ([`App::can_create_preset`]). `bucket_id` must name
    /// an existing bucket.
    pub fn add_preset(
        &mut self,
        label: &str,
        text: &str,
        icon: Option<&str>,
        bucket_id: Option<&str>,
    ) -> Result<WidgetPreset, BucketError> {
        if let Some(id) = bucket_id
            && !self.buckets().iter().any(|b| b.id == id)
        {
            return Err(BucketError::UnknownBucket(id.to_string()));
        }
        let (presets, preset) =
            bucket_ops::with_new_preset(self.presets(), label, text, icon, bucket_id)?;
        self.store_presets(&presets)?;
        Ok(preset)
    }

    pub fn remove_preset(&mut self, id: &str) -> MutationOutcome {
        let Some(presets) = bucket_ops::without_preset(self.presets(), id) else {
            return MutationOutcome::NotFound;
        };
        if let Err(e) = self.store_presets(&presets) {
            tracing::warn!(id, error = %e, "preset removal not stored");
        }
        MutationOutcome::Applied
    }

    fn store_presets(&mut self, presets: &[WidgetPreset]) -> Result<(), StoreError> {
        self.local.write_collection(keys::PRESETS, presets)?;
        self.publish_presets(presets);
        Ok(())
    }

    fn publish_presets(&mut self, presets: &[WidgetPreset]) {
        let Some(shared) = self.shared.as_mut() else {
            tracing::warn!("shared container unavailable, widget presets not published");
            return;
        };
        if let Err(e) = shared.write_collection(keys::PRESETS, presets) {
            tracing::warn!(error = %e, "could not publish widget presets");
        }
    }

    // -----------------------------------------------------------------------
    // Quota gate
    // -----------------------------------------------------------------------

    pub fn gate(&self) -> &QuotaGate {
        &self.gate
    }

    pub fn can_create_log(&self) -> bool {
        self.gate.can_create_log()
    }

    pub fn can_create_bucket(&self) -> bool {
        self.gate.can_create_bucket(self.buckets().len())
    }

    pub fn can_create_preset(&self) -> bool {
        self.gate.can_create_preset(self.presets().len())
    }

    pub fn logs_remaining(&self) -> Remaining {
        self.gate.logs_remaining()
    }

    pub fn record_log_created(&mut self) {
        if let Err(e) = self.gate.record_log_created(&mut self.local) {
            tracing::warn!(error = %e, "could not persist log counter");
        }
    }

    pub fn set_entitled(&mut self, entitled: bool) {
        if let Err(e) = self.gate.set_entitled(&mut self.local, entitled) {
            tracing::warn!(error = %e, "could not persist entitlement");
        }
    }

    pub fn mark_seen(&mut self, prompt: Prompt) {
        if let Err(e) = self.gate.mark_seen(&mut self.local, prompt) {
            tracing::warn!(error = %e, "could not persist seen flag");
        }
    }

    /// Nudges due after the latest capture, each reported only once.
    pub fn take_nudges(&mut self) -> Nudges {
        match self.gate.take_nudges(&mut self.local) {
            Ok(nudges) => nudges,
            Err(e) => {
                tracing::warn!(error = %e, "could not persist nudge flags");
                Nudges::default()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Erase every log, bucket and preset in both stores. The tier, the
    /// quota counter and the seen flags are kept.
    pub fn wipe(&mut self) {
        if let Err(e) = self.local.clear(keys::USER_DATA) {
            tracing::warn!(error = %e, "could not clear local store");
        }
        if let Some(shared) = self.shared.as_ref() {
            let result = shared.lock().and_then(|mut txn| {
                txn.write(keys::LOGS, "[]")?;
                txn.write(keys::PRESETS, "[]")?;
                txn.clear(&[keys::PENDING_WIDGET_CAPTURES])
            });
            if let Err(e) = result {
                tracing::warn!(error = %e, "could not clear shared container");
            }
        }
    }

    /// Flush pending local writes and release the stores.
    pub fn close(self) -> Result<(), StoreError> {
        self.local.close()
    }
}

fn open_shared(dir: &Path, hook: Arc<dyn RefreshHook>) -> Option<SharedStore> {
    match SharedStore::open(dir, hook) {
        Ok(store) => Some(store),
        Err(e) => {
            tracing::warn!(error = %e, "shared container unavailable, running local-only");
            None
        }
    }
}
