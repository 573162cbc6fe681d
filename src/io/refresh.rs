use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;

/// Signal to the widget rendering layer that the log collection changed.
///
/// Fire-and-forget: implementations must not fail the caller.
pub trait RefreshHook: Send + Sync {
    fn refresh_needed(&self);
}

/// Drops the signal.
pub struct NoRefresh;

impl RefreshHook for NoRefresh {
    fn refresh_needed(&self) {}
}

/// Touches a marker file the widget renderer polls, writing the time of the
/// last change.
pub struct MarkerRefresh {
    path: PathBuf,
}

impl MarkerRefresh {
    pub fn new(shared_dir: &Path) -> Self {
        MarkerRefresh {
            path: shared_dir.join(".refresh"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RefreshHook for MarkerRefresh {
    fn refresh_needed(&self) {
        let stamp = Utc::now().to_rfc3339();
        if let Err(e) = std::fs::write(&self.path, stamp) {
            tracing::debug!(path = %self.path.display(), error = %e, "refresh marker not written");
        }
    }
}

/// Counts signals. Useful for asserting that a write reached the widget layer.
#[derive(Default)]
pub struct CountingRefresh {
    count: AtomicUsize,
}

impl CountingRefresh {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl RefreshHook for CountingRefresh {
    fn refresh_needed(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
