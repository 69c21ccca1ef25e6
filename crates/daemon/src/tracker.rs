// Change tracker: filters raw change notifications and keeps the
// "pending changes" flag shared between the watcher and the push loop.
//
// The flag is two monotonic counters: events recorded and events
// acknowledged. Pending means recorded > acknowledged. A clear only
// acknowledges events the clearing side has observed, so a `record()`
// racing with a clear keeps the flag set.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

/// Path substrings that never count as a change: git internals and our own
/// log output. Always applied, configured patterns are added on top.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[".git", ".logs", ".auto-push.log"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A single change notification from the filesystem watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self { path: path.into(), kind }
    }
}

/// Point in the event sequence, used to clear only what has been observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PendingSnapshot(u64);

#[derive(Debug)]
pub struct ChangeTracker {
    ignore_patterns: Vec<String>,
    recorded: AtomicU64,
    acknowledged: AtomicU64,
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ChangeTracker {
    /// Tracker ignoring the default patterns plus `extra_patterns`.
    pub fn new(extra_patterns: impl IntoIterator<Item = String>) -> Self {
        let mut ignore_patterns: Vec<String> =
            DEFAULT_IGNORE_PATTERNS.iter().map(|pattern| pattern.to_string()).collect();
        for pattern in extra_patterns {
            if !pattern.is_empty() && !ignore_patterns.contains(&pattern) {
                ignore_patterns.push(pattern);
            }
        }
        Self {
            ignore_patterns,
            recorded: AtomicU64::new(0),
            acknowledged: AtomicU64::new(0),
        }
    }

    /// Record a change. Returns false when the path is ignored.
    pub fn record(&self, event: &ChangeEvent) -> bool {
        if self.is_ignored(&event.path) {
            trace!(path = %event.path.display(), "ignoring change in excluded path");
            return false;
        }

        self.recorded.fetch_add(1, Ordering::AcqRel);
        debug!(path = %event.path.display(), kind = ?event.kind, "change detected");
        true
    }

    /// Whether the path contains any excluded substring.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let path = path.to_string_lossy();
        self.ignore_patterns.iter().any(|pattern| path.contains(pattern.as_str()))
    }

    pub fn has_pending(&self) -> bool {
        // Acknowledged first: it never exceeds `recorded`, so this order
        // cannot report a spurious pending state.
        let acknowledged = self.acknowledged.load(Ordering::Acquire);
        self.recorded.load(Ordering::Acquire) > acknowledged
    }

    pub fn snapshot(&self) -> PendingSnapshot {
        PendingSnapshot(self.recorded.load(Ordering::Acquire))
    }

    /// Acknowledge every event up to `snapshot`. Later events stay pending.
    pub fn clear_through(&self, snapshot: PendingSnapshot) {
        self.acknowledged.fetch_max(snapshot.0, Ordering::AcqRel);
    }

    /// Acknowledge every event recorded so far.
    pub fn clear_pending(&self) {
        self.clear_through(self.snapshot());
    }

    pub fn ignore_patterns(&self) -> &[String] {
        &self.ignore_patterns
    }
}
