// File watcher: inotify/fsevents → ChangeEvent stream.
//
// Paths are reported relative to the watched root so ignore patterns never
// match on the directory the repository happens to live in.

use anyhow::{Context, Result};
use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::tracker::{ChangeEvent, ChangeKind};

/// Events buffered between the notify thread and the tracker feeder.
const CHANGE_BUFFER: usize = 512;

/// Watches a working tree recursively using the OS-native backend.
///
/// Dropping the watcher ends the subscription and, once buffered changes
/// are drained, closes the receiver returned by `start()`.
pub struct FileWatcher {
    _inner: RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    /// Start watching `root` recursively.
    pub fn start(root: &Path) -> Result<(Self, mpsc::Receiver<ChangeEvent>)> {
        let root = std::fs::canonicalize(root)
            .with_context(|| format!("cannot resolve repository root {}", root.display()))?;
        let (changes_tx, changes_rx) = mpsc::channel(CHANGE_BUFFER);

        let callback_root = root.clone();
        let mut inner = notify::recommended_watcher(move |res: notify::Result<Event>| {
            dispatch(res, &callback_root, &changes_tx)
        })
        .context("cannot create filesystem watcher")?;
        inner
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("cannot watch {}", root.display()))?;

        debug!(root = %root.display(), "filesystem watcher running");
        Ok((Self { _inner: inner, root }, changes_rx))
    }

    /// The canonicalized root directory being watched.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Runs on the notify thread.
fn dispatch(res: notify::Result<Event>, root: &Path, changes: &mpsc::Sender<ChangeEvent>) {
    let event = match res {
        Ok(event) => event,
        Err(err) => {
            error!(error = %err, "filesystem watcher error");
            return;
        }
    };

    for change in translate_event(&event, root) {
        if changes.blocking_send(change).is_err() {
            debug!("change receiver dropped, discarding event");
            return;
        }
    }
}

/// Map a notify event kind to a change kind. Directory-only, metadata and
/// access events are not content changes.
fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(CreateKind::Folder) => None,
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        // Renames surface as a modify on both the old and new path.
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(RemoveKind::Folder) => None,
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        _ => None,
    }
}

/// Translate a `notify::Event` into zero or more `ChangeEvent`s with
/// root-relative paths.
fn translate_event(event: &Event, root: &Path) -> Vec<ChangeEvent> {
    let Some(kind) = classify(&event.kind) else {
        trace!(kind = ?event.kind, "skipping non-content event");
        return Vec::new();
    };

    event
        .paths
        .iter()
        .filter_map(|path| match path.strip_prefix(root) {
            Ok(relative) if !relative.as_os_str().is_empty() => Some((path, relative)),
            Ok(_) => None,
            Err(_) => {
                warn!(path = %path.display(), "ignoring event outside watch root");
                None
            }
        })
        // Deleted paths can't be stat'ed; everything else that is a directory is noise.
        .filter(|(path, _)| kind == ChangeKind::Deleted || !path.is_dir())
        .map(|(_, relative)| ChangeEvent::new(relative, kind))
        .collect()
}
