// Daemon runtime: preflight, then watcher → tracker and the push tick loop
// until shutdown.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::config::AutoPushConfig;
use crate::git::orchestrator::PushOrchestrator;
use crate::git::worker::{GitWorker, VcsBackend};
use crate::startup::{log_status, preflight};
use crate::tracker::{ChangeEvent, ChangeTracker};
use crate::watcher::FileWatcher;

/// Run against `repo_root` until Ctrl-C.
pub async fn run(repo_root: &Path, config: &AutoPushConfig) -> Result<()> {
    let worker = GitWorker::new(repo_root).with_timeout(config.command_timeout());

    preflight(&worker, &config.git.remote).await.context("startup checks failed")?;
    log_status(&worker, &config.git.fallback_branch).await;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(());
    });

    run_until_shutdown(worker, repo_root, config, shutdown_rx).await
}

/// Watch `repo_root` and push pending changes on every tick until `shutdown`
/// fires. A push cycle in flight when shutdown arrives runs to completion.
pub async fn run_until_shutdown<B: VcsBackend>(
    backend: B,
    repo_root: &Path,
    config: &AutoPushConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let extra_ignores = config.watch.extra_ignore_patterns.iter().cloned();
    let tracker = Arc::new(ChangeTracker::new(extra_ignores));
    let (watcher, events) = FileWatcher::start(repo_root)?;
    let feeder = tokio::spawn(feed_tracker(events, Arc::clone(&tracker)));

    let mut orchestrator = PushOrchestrator::new(backend, tracker, config.push_policy());
    let mut ticker = tokio::time::interval(config.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(root = %watcher.root().display(), "watching for changes, press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(outcome) = orchestrator.tick().await {
                    debug!(success = outcome.is_success(), %outcome, "push cycle finished");
                }
            }
            _ = shutdown.recv() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    drop(watcher);
    feeder.abort();
    info!("auto-push stopped");
    Ok(())
}

async fn feed_tracker(mut events: mpsc::Receiver<ChangeEvent>, tracker: Arc<ChangeTracker>) {
    while let Some(event) = events.recv().await {
        tracker.record(&event);
    }
}
