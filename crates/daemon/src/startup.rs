// Startup preflight: git identity, remote reachability, status summary.
//
// Any failure here is fatal; the daemon exits before it starts watching.

use thiserror::Error;
use tracing::{info, warn};

use crate::git::worker::{branch_or, GitWorkerError, VcsBackend};

/// Identity keys git needs before it will commit.
const IDENTITY_KEYS: [&str; 2] = ["user.name", "user.email"];

#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("git is not available: {0}")]
    GitUnavailable(#[source] GitWorkerError),

    #[error("git {key} is not configured; set it with `git config {key} <value>`")]
    MissingIdentity { key: &'static str },

    #[error("cannot reach remote `{remote}`: {source}")]
    RemoteUnreachable {
        remote: String,
        #[source]
        source: GitWorkerError,
    },
}

/// Check that commits can be authored.
pub async fn check_identity<B: VcsBackend>(backend: &B) -> Result<(), PreflightError> {
    info!("checking git configuration");
    for key in IDENTITY_KEYS {
        match backend.config_get(key).await {
            Ok(output) if !output.is_empty() => {}
            Ok(_) => return Err(PreflightError::MissingIdentity { key }),
            Err(error @ GitWorkerError::SpawnFailed { .. }) => {
                return Err(PreflightError::GitUnavailable(error));
            }
            Err(_) => return Err(PreflightError::MissingIdentity { key }),
        }
    }
    info!("git identity configured");
    Ok(())
}

/// Check that `remote` answers `ls-remote`.
pub async fn check_remote<B: VcsBackend>(backend: &B, remote: &str) -> Result<(), PreflightError> {
    info!(%remote, "checking remote connectivity");
    match backend.ls_remote(remote).await {
        Ok(_) => {
            info!(%remote, "remote reachable");
            Ok(())
        }
        Err(error @ GitWorkerError::SpawnFailed { .. }) => {
            Err(PreflightError::GitUnavailable(error))
        }
        Err(source) => {
            Err(PreflightError::RemoteUnreachable { remote: remote.to_string(), source })
        }
    }
}

pub async fn preflight<B: VcsBackend>(backend: &B, remote: &str) -> Result<(), PreflightError> {
    check_identity(backend).await?;
    check_remote(backend, remote).await
}

/// Log the current branch and short working-tree status.
pub async fn log_status<B: VcsBackend>(backend: &B, fallback_branch: &str) {
    let branch = branch_or(backend, fallback_branch).await;

    match backend.status_short().await {
        Ok(output) if output.is_empty() => info!(%branch, "repository status: no local changes"),
        Ok(output) => {
            let lines: Vec<&str> = output.stdout.lines().filter(|l| !l.trim().is_empty()).collect();
            info!(%branch, changed = lines.len(), "repository status: local changes present");
            for line in lines {
                info!("  {line}");
            }
        }
        Err(error) => warn!(%branch, %error, "could not read repository status"),
    }
}
