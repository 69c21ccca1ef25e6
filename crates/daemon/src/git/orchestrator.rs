// Push orchestration: decides when pending changes are due and runs
// stage -> commit -> push with bounded retries.
//
// Local checks (pending flag, cooldown) run before any git call, so the
// backend is only queried when a push is plausible. A push attempt claims
// the pending state up front; changes arriving during or after the attempt
// set the flag again on their own.

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::worker::{branch_or, GitWorkerError, VcsBackend};
use crate::tracker::ChangeTracker;

/// Marker git prints when a commit would be empty.
const NOTHING_TO_COMMIT: &str = "nothing to commit";

// ── Policy ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushPolicy {
    /// Minimum time between two push attempts.
    pub cooldown: Duration,
    /// Total push attempts per cycle, including the first.
    pub max_retries: u32,
    /// Pause between failed push attempts.
    pub retry_delay: Duration,
    pub remote: String,
    /// Branch pushed when the current branch cannot be resolved.
    pub fallback_branch: String,
}

impl Default for PushPolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(10),
            max_retries: 3,
            retry_delay: Duration::from_secs(10),
            remote: "origin".into(),
            fallback_branch: "main".into(),
        }
    }
}

// ── Outcome ─────────────────────────────────────────────────────────

/// Result of one push cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed { branch: String, attempts: u32 },
    /// Staging produced no commit; nothing was pushed. Not an error.
    NothingToCommit,
    StageFailed(GitWorkerError),
    CommitFailed(GitWorkerError),
    PushFailed { attempts: u32, last_error: GitWorkerError },
}

impl PushOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PushOutcome::Pushed { .. })
    }
}

impl Display for PushOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PushOutcome::Pushed { branch, attempts } => {
                write!(f, "pushed `{branch}` after {attempts} attempt(s)")
            }
            PushOutcome::NothingToCommit => write!(f, "nothing to commit"),
            PushOutcome::StageFailed(error) => write!(f, "staging failed: {error}"),
            PushOutcome::CommitFailed(error) => write!(f, "commit failed: {error}"),
            PushOutcome::PushFailed { attempts, last_error } => {
                write!(f, "push failed after {attempts} attempt(s): {last_error}")
            }
        }
    }
}

// ── Observer ────────────────────────────────────────────────────────

/// Progress reports from the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// Events fired but the tree matches the last commit and nothing is unpushed.
    FalsePositive,
    Committing { branch: String },
    StageFailed { error: GitWorkerError },
    Committed { message: String },
    NothingToCommit,
    CommitFailed { error: GitWorkerError },
    PushAttempt { remote: String, branch: String, attempt: u32, max_attempts: u32 },
    PushRetryScheduled { attempt: u32, delay: Duration, error: GitWorkerError },
    Pushed { remote: String, branch: String, attempt: u32 },
    PushExhausted { attempts: u32, error: GitWorkerError },
}

/// Receives orchestrator progress; the caller decides where it goes.
pub trait PushObserver: Send + Sync {
    fn notify(&self, event: &PushEvent);
}

/// Forwards progress to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PushObserver for TracingObserver {
    fn notify(&self, event: &PushEvent) {
        match event {
            PushEvent::FalsePositive => {
                debug!("changes detected but working tree matches last commit, skipping push")
            }
            PushEvent::Committing { branch } => info!(%branch, "committing changes"),
            PushEvent::StageFailed { error } => error!(%error, "failed to stage changes"),
            PushEvent::Committed { message } => info!(%message, "commit created"),
            PushEvent::NothingToCommit => warn!("no changes to commit"),
            PushEvent::CommitFailed { error } => error!(%error, "failed to commit changes"),
            PushEvent::PushAttempt { remote, branch, attempt, max_attempts } => {
                info!(%remote, %branch, attempt, max_attempts, "pushing");
            }
            PushEvent::PushRetryScheduled { attempt, delay, error } => warn!(
                attempt,
                delay_secs = delay.as_secs(),
                %error,
                "push failed, retrying after delay"
            ),
            PushEvent::Pushed { remote, branch, attempt } => {
                info!(%remote, %branch, attempt, "push succeeded");
            }
            PushEvent::PushExhausted { attempts, error } => {
                error!(attempts, %error, "push failed, giving up until new changes arrive");
            }
        }
    }
}

// ── Orchestrator ────────────────────────────────────────────────────

/// Commit message for an automatic push made at `at`.
pub fn commit_message(at: DateTime<Local>) -> String {
    format!("Auto-push: {}", at.format("%Y-%m-%d %H:%M:%S"))
}

pub struct PushOrchestrator<B, O = TracingObserver> {
    backend: B,
    tracker: Arc<ChangeTracker>,
    observer: O,
    policy: PushPolicy,
    last_push_at: Option<Instant>,
}

impl<B: VcsBackend> PushOrchestrator<B, TracingObserver> {
    pub fn new(backend: B, tracker: Arc<ChangeTracker>, policy: PushPolicy) -> Self {
        Self::with_observer(backend, tracker, policy, TracingObserver)
    }
}

impl<B: VcsBackend, O: PushObserver> PushOrchestrator<B, O> {
    pub fn with_observer(
        backend: B,
        tracker: Arc<ChangeTracker>,
        policy: PushPolicy,
        observer: O,
    ) -> Self {
        Self { backend, tracker, observer, policy, last_push_at: None }
    }

    pub fn policy(&self) -> &PushPolicy {
        &self.policy
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// When the last push attempt started, if any.
    pub fn last_push_at(&self) -> Option<Instant> {
        self.last_push_at
    }

    /// One loop iteration: push if due.
    pub async fn tick(&mut self) -> Option<PushOutcome> {
        self.tick_at(Instant::now()).await
    }

    pub async fn tick_at(&mut self, now: Instant) -> Option<PushOutcome> {
        if !self.should_push_at(now).await {
            return None;
        }
        Some(self.run_at(now).await)
    }

    pub async fn should_push(&self) -> bool {
        self.should_push_at(Instant::now()).await
    }

    /// Whether a push is due at `now`.
    ///
    /// Clears the pending flag when the backend shows neither working-tree
    /// changes nor unpushed commits (e.g. a file touched and reverted).
    pub async fn should_push_at(&self, now: Instant) -> bool {
        if !self.tracker.has_pending() {
            return false;
        }

        if !self.cooldown_elapsed(now) {
            return false;
        }

        let observed = self.tracker.snapshot();
        if self.has_local_changes().await || self.has_unpushed_commits().await {
            return true;
        }

        self.tracker.clear_through(observed);
        self.observer.notify(&PushEvent::FalsePositive);
        false
    }

    pub async fn run(&mut self) -> PushOutcome {
        self.run_at(Instant::now()).await
    }

    /// Stage, commit and push. Call only after `should_push_at` returned true.
    pub async fn run_at(&mut self, now: Instant) -> PushOutcome {
        self.last_push_at = Some(now);
        self.tracker.clear_pending();

        let branch = branch_or(&self.backend, &self.policy.fallback_branch).await;
        self.observer.notify(&PushEvent::Committing { branch: branch.clone() });

        if let Err(error) = self.backend.add_all().await {
            self.observer.notify(&PushEvent::StageFailed { error: error.clone() });
            return PushOutcome::StageFailed(error);
        }

        let message = commit_message(Local::now());
        let committed = self.backend.commit(&message).await;
        match committed {
            Ok(_) => self.observer.notify(&PushEvent::Committed { message }),
            Err(error) if error.mentions(NOTHING_TO_COMMIT) => {
                self.observer.notify(&PushEvent::NothingToCommit);
                return PushOutcome::NothingToCommit;
            }
            Err(error) => {
                self.observer.notify(&PushEvent::CommitFailed { error: error.clone() });
                return PushOutcome::CommitFailed(error);
            }
        }

        self.push_with_retry(branch).await
    }

    async fn push_with_retry(&self, branch: String) -> PushOutcome {
        let max_attempts = self.policy.max_retries.max(1);
        let remote = self.policy.remote.as_str();
        let mut attempt = 1;

        loop {
            self.observer.notify(&PushEvent::PushAttempt {
                remote: remote.to_string(),
                branch: branch.clone(),
                attempt,
                max_attempts,
            });

            let pushed = self.backend.push(remote, &branch).await;
            let error = match pushed {
                Ok(_) => {
                    self.observer.notify(&PushEvent::Pushed {
                        remote: remote.to_string(),
                        branch: branch.clone(),
                        attempt,
                    });
                    return PushOutcome::Pushed { branch, attempts: attempt };
                }
                Err(error) => error,
            };

            if attempt >= max_attempts {
                self.observer
                    .notify(&PushEvent::PushExhausted { attempts: attempt, error: error.clone() });
                return PushOutcome::PushFailed { attempts: attempt, last_error: error };
            }

            self.observer.notify(&PushEvent::PushRetryScheduled {
                attempt,
                delay: self.policy.retry_delay,
                error,
            });
            tokio::time::sleep(self.policy.retry_delay).await;
            attempt += 1;
        }
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        match self.last_push_at {
            Some(last) => now
                .checked_duration_since(last)
                .is_some_and(|elapsed| elapsed >= self.policy.cooldown),
            None => true,
        }
    }

    async fn has_local_changes(&self) -> bool {
        match self.backend.status_porcelain().await {
            Ok(output) => !output.is_empty(),
            Err(error) => {
                // Let the push cycle surface the real failure.
                warn!(%error, "could not read working tree status");
                true
            }
        }
    }

    async fn has_unpushed_commits(&self) -> bool {
        match self.backend.rev_list_unpushed().await {
            Ok(output) => !output.is_empty(),
            Err(error) => {
                // Usually no upstream is configured yet.
                debug!(%error, "could not list unpushed commits");
                false
            }
        }
    }

}
