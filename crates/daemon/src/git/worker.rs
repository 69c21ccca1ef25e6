// Git backend: runs `git` subprocesses in the watched repository.
//
// Every call goes through a `CommandExecutor` and is bounded by a timeout.
// A timeout is reported as a command failure, never a panic.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Default upper bound for a single git invocation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl GitCommandOutput {
    /// True when the command printed nothing but whitespace on stdout.
    pub fn is_empty(&self) -> bool {
        self.stdout.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GitWorkerError {
    #[error("failed to run `{command}`: {message}")]
    SpawnFailed { command: String, message: String },

    #[error("`{command}` timed out after {}s", .timeout.as_secs())]
    TimedOut { command: String, timeout: Duration },

    #[error("`{command}` failed with code {code:?}: {}", failure_detail(.stdout, .stderr))]
    CommandFailed { command: String, code: Option<i32>, stdout: String, stderr: String },
}

impl GitWorkerError {
    /// Whether the command's stdout or stderr contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        match self {
            GitWorkerError::CommandFailed { stdout, stderr, .. } => {
                stdout.contains(needle) || stderr.contains(needle)
            }
            _ => false,
        }
    }
}

fn failure_detail<'a>(stdout: &'a str, stderr: &'a str) -> &'a str {
    if stderr.trim().is_empty() {
        stdout.trim()
    } else {
        stderr.trim()
    }
}

pub type GitResult = Result<GitCommandOutput, GitWorkerError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs an external program. Implementations must give up after `timeout`
/// and report it as an `io::ErrorKind::TimedOut` error.
pub trait CommandExecutor: Send + Sync {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
        timeout: Duration,
    ) -> impl Future<Output = Result<CommandResult, io::Error>> + Send;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandExecutor;

impl CommandExecutor for ProcessCommandExecutor {
    async fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<CommandResult, io::Error> {
        let mut command = tokio::process::Command::new(program);
        command.args(args).current_dir(cwd).stdin(Stdio::null()).kill_on_drop(true);

        let output = tokio::time::timeout(timeout, command.output()).await.map_err(|_| {
            io::Error::new(io::ErrorKind::TimedOut, format!("`{program}` exceeded {timeout:?}"))
        })??;

        Ok(CommandResult {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// The version-control operations the push loop and startup checks need.
///
/// `GitWorker` is the production implementation. Tests script a stub.
pub trait VcsBackend: Send + Sync {
    /// `git config <key>`.
    fn config_get(&self, key: &str) -> impl Future<Output = GitResult> + Send;

    /// `git ls-remote --heads <remote>`; success means the remote is reachable.
    fn ls_remote(&self, remote: &str) -> impl Future<Output = GitResult> + Send;

    /// `git status --porcelain`; empty stdout means a clean working tree.
    fn status_porcelain(&self) -> impl Future<Output = GitResult> + Send;

    /// `git status --short`, for human-readable status summaries.
    fn status_short(&self) -> impl Future<Output = GitResult> + Send;

    /// `git rev-list @{u}..HEAD`; one line per commit not yet on the upstream.
    fn rev_list_unpushed(&self) -> impl Future<Output = GitResult> + Send;

    /// `git rev-parse --abbrev-ref HEAD`.
    fn current_branch(&self) -> impl Future<Output = GitResult> + Send;

    /// `git add -A`.
    fn add_all(&self) -> impl Future<Output = GitResult> + Send;

    /// `git commit -m <message>`.
    fn commit(&self, message: &str) -> impl Future<Output = GitResult> + Send;

    /// `git push <remote> <branch>`.
    fn push(&self, remote: &str, branch: &str) -> impl Future<Output = GitResult> + Send;
}

/// What `rev-parse --abbrev-ref HEAD` prints when HEAD is detached.
const DETACHED_HEAD: &str = "HEAD";

/// The checked-out branch, or `fallback` when HEAD is detached or the
/// lookup fails.
pub async fn branch_or<B: VcsBackend>(backend: &B, fallback: &str) -> String {
    match backend.current_branch().await {
        Ok(output) => match output.stdout.trim() {
            "" | DETACHED_HEAD => {
                debug!(%fallback, "no branch checked out, using fallback branch");
                fallback.to_string()
            }
            name => name.to_string(),
        },
        Err(error) => {
            debug!(%error, %fallback, "using fallback branch");
            fallback.to_string()
        }
    }
}

#[derive(Debug, Clone)]
pub struct GitWorker<E = ProcessCommandExecutor> {
    repo_path: PathBuf,
    executor: E,
    timeout: Duration,
}

impl GitWorker<ProcessCommandExecutor> {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self::with_executor(repo_path, ProcessCommandExecutor)
    }
}

impl<E: CommandExecutor> GitWorker<E> {
    pub fn with_executor(repo_path: impl Into<PathBuf>, executor: E) -> Self {
        Self { repo_path: repo_path.into(), executor, timeout: DEFAULT_COMMAND_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    async fn run(&self, args: &[&str]) -> GitResult {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        let command = format!("git {}", args.join(" "));
        let result = self
            .executor
            .execute("git", &args, &self.repo_path, self.timeout)
            .await
            .map_err(|error| match error.kind() {
                io::ErrorKind::TimedOut => {
                    GitWorkerError::TimedOut { command: command.clone(), timeout: self.timeout }
                }
                _ => GitWorkerError::SpawnFailed {
                    command: command.clone(),
                    message: error.to_string(),
                },
            })?;

        if result.success {
            return Ok(GitCommandOutput { stdout: result.stdout, stderr: result.stderr });
        }

        Err(GitWorkerError::CommandFailed {
            command,
            code: result.code,
            stdout: result.stdout,
            stderr: result.stderr,
        })
    }
}

impl<E: CommandExecutor> VcsBackend for GitWorker<E> {
    async fn config_get(&self, key: &str) -> GitResult {
        self.run(&["config", key]).await
    }

    async fn ls_remote(&self, remote: &str) -> GitResult {
        self.run(&["ls-remote", "--heads", remote]).await
    }

    async fn status_porcelain(&self) -> GitResult {
        self.run(&["status", "--porcelain"]).await
    }

    async fn status_short(&self) -> GitResult {
        self.run(&["status", "--short"]).await
    }

    async fn rev_list_unpushed(&self) -> GitResult {
        self.run(&["rev-list", "@{u}..HEAD"]).await
    }

    async fn current_branch(&self) -> GitResult {
        self.run(&["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    async fn add_all(&self) -> GitResult {
        self.run(&["add", "-A"]).await
    }

    async fn commit(&self, message: &str) -> GitResult {
        self.run(&["commit", "-m", message]).await
    }

    async fn push(&self, remote: &str, branch: &str) -> GitResult {
        self.run(&["push", remote, branch]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Invocation {
        program: String,
        args: Vec<String>,
        cwd: PathBuf,
        timeout: Duration,
    }

    #[derive(Clone)]
    struct MockExecutor {
        calls: Arc<Mutex<Vec<Invocation>>>,
        responses: Arc<Mutex<VecDeque<Result<CommandResult, io::Error>>>>,
    }

    impl MockExecutor {
        fn new(responses: Vec<Result<CommandResult, io::Error>>) -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            }
        }

        fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().expect("mock calls lock poisoned").clone()
        }
    }

    impl CommandExecutor for MockExecutor {
        async fn execute(
            &self,
            program: &str,
            args: &[String],
            cwd: &Path,
            timeout: Duration,
        ) -> Result<CommandResult, io::Error> {
            self.calls.lock().expect("mock calls lock poisoned").push(Invocation {
                program: program.to_string(),
                args: args.to_vec(),
                cwd: cwd.to_path_buf(),
                timeout,
            });

            self.responses
                .lock()
                .expect("mock responses lock poisoned")
                .pop_front()
                .expect("missing mock response")
        }
    }

    fn ok(stdout: &str) -> Result<CommandResult, io::Error> {
        Ok(CommandResult {
            success: true,
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        })
    }

    fn failed(code: i32, stdout: &str, stderr: &str) -> Result<CommandResult, io::Error> {
        Ok(CommandResult {
            success: false,
            code: Some(code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        })
    }

    #[tokio::test]
    async fn status_porcelain_runs_in_repo_with_default_timeout() {
        let mock = MockExecutor::new(vec![ok(" M README.md\n")]);
        let worker = GitWorker::with_executor("/tmp/repo", mock.clone());

        let output = worker.status_porcelain().await.expect("status should succeed");

        assert_eq!(output.stdout, " M README.md\n");
        assert!(!output.is_empty());
        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "git");
        assert_eq!(calls[0].args, vec!["status", "--porcelain"]);
        assert_eq!(calls[0].cwd, PathBuf::from("/tmp/repo"));
        assert_eq!(calls[0].timeout, DEFAULT_COMMAND_TIMEOUT);
    }

    #[tokio::test]
    async fn with_timeout_is_passed_to_executor() {
        let mock = MockExecutor::new(vec![ok("")]);
        let worker = GitWorker::with_executor("/tmp/repo", mock.clone())
            .with_timeout(Duration::from_secs(5));

        let _ = worker.add_all().await.expect("add should succeed");

        let calls = mock.calls();
        assert_eq!(calls[0].args, vec!["add", "-A"]);
        assert_eq!(calls[0].timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn commit_passes_message_as_single_argument() {
        let mock = MockExecutor::new(vec![ok("[main abc123] Auto-push\n")]);
        let worker = GitWorker::with_executor("/tmp/repo", mock.clone());

        let _ = worker
            .commit("Auto-push: 2026-01-02 03:04:05")
            .await
            .expect("commit should succeed");

        let calls = mock.calls();
        assert_eq!(calls[0].args, vec!["commit", "-m", "Auto-push: 2026-01-02 03:04:05"]);
    }

    #[tokio::test]
    async fn query_commands_use_expected_arguments() {
        let mock = MockExecutor::new(vec![ok("Alice\n"), ok(""), ok(""), ok(""), ok("main\n")]);
        let worker = GitWorker::with_executor("/tmp/repo", mock.clone());

        let name = worker.config_get("user.name").await.expect("config should succeed");
        assert_eq!(name.stdout.trim(), "Alice");
        let _ = worker.ls_remote("origin").await.expect("ls-remote should succeed");
        let _ = worker.status_short().await.expect("status should succeed");
        let unpushed = worker.rev_list_unpushed().await.expect("rev-list should succeed");
        assert!(unpushed.is_empty());
        let _ = worker.current_branch().await.expect("rev-parse should succeed");

        let args: Vec<Vec<String>> = mock.calls().into_iter().map(|call| call.args).collect();
        assert_eq!(args[0], vec!["config", "user.name"]);
        assert_eq!(args[1], vec!["ls-remote", "--heads", "origin"]);
        assert_eq!(args[2], vec!["status", "--short"]);
        assert_eq!(args[3], vec!["rev-list", "@{u}..HEAD"]);
        assert_eq!(args[4], vec!["rev-parse", "--abbrev-ref", "HEAD"]);
    }

    #[tokio::test]
    async fn push_targets_remote_and_branch() {
        let mock = MockExecutor::new(vec![ok("")]);
        let worker = GitWorker::with_executor("/tmp/repo", mock.clone());

        let _ = worker.push("origin", "develop").await.expect("push should succeed");

        assert_eq!(mock.calls()[0].args, vec!["push", "origin", "develop"]);
    }

    #[tokio::test]
    async fn push_failure_keeps_both_streams() {
        let mock = MockExecutor::new(vec![failed(128, "", "fatal: unable to access remote\n")]);
        let worker = GitWorker::with_executor("/tmp/repo", mock);

        let error = worker.push("origin", "main").await.expect_err("push should fail");
        assert_eq!(
            error,
            GitWorkerError::CommandFailed {
                command: "git push origin main".to_string(),
                code: Some(128),
                stdout: String::new(),
                stderr: "fatal: unable to access remote\n".to_string(),
            }
        );
        assert_eq!(
            error.to_string(),
            "`git push origin main` failed with code Some(128): fatal: unable to access remote"
        );
    }

    #[tokio::test]
    async fn nothing_to_commit_is_detected_on_stdout() {
        let mock = MockExecutor::new(vec![failed(
            1,
            "On branch main\nnothing to commit, working tree clean\n",
            "",
        )]);
        let worker = GitWorker::with_executor("/tmp/repo", mock);

        let error = worker.commit("Auto-push").await.expect_err("commit should fail");
        assert!(error.mentions("nothing to commit"));
        assert!(error.to_string().contains("nothing to commit"));
    }

    #[tokio::test]
    async fn executor_timeout_maps_to_timed_out() {
        let mock = MockExecutor::new(vec![Err(io::Error::new(io::ErrorKind::TimedOut, "slow"))]);
        let worker =
            GitWorker::with_executor("/tmp/repo", mock).with_timeout(Duration::from_secs(30));

        let error = worker.ls_remote("origin").await.expect_err("ls-remote should time out");
        assert_eq!(
            error,
            GitWorkerError::TimedOut {
                command: "git ls-remote --heads origin".to_string(),
                timeout: Duration::from_secs(30),
            }
        );
        assert!(!error.mentions("slow"));
    }

    #[tokio::test]
    async fn missing_binary_maps_to_spawn_failed() {
        let mock =
            MockExecutor::new(vec![Err(io::Error::new(io::ErrorKind::NotFound, "no such file"))]);
        let worker = GitWorker::with_executor("/tmp/repo", mock);

        let error = worker.config_get("user.email").await.expect_err("config should fail");
        assert!(matches!(error, GitWorkerError::SpawnFailed { .. }));
    }

    #[tokio::test]
    async fn branch_or_returns_checked_out_branch() {
        let mock = MockExecutor::new(vec![ok("release/2\n")]);
        let worker = GitWorker::with_executor("/tmp/repo", mock);
        assert_eq!(branch_or(&worker, "main").await, "release/2");
    }

    #[tokio::test]
    async fn branch_or_falls_back_on_detached_head() {
        let mock = MockExecutor::new(vec![ok("HEAD\n")]);
        let worker = GitWorker::with_executor("/tmp/repo", mock);
        assert_eq!(branch_or(&worker, "main").await, "main");
    }

    #[tokio::test]
    async fn branch_or_falls_back_when_lookup_fails() {
        let mock = MockExecutor::new(vec![failed(128, "", "fatal: not a git repository\n")]);
        let worker = GitWorker::with_executor("/tmp/repo", mock);
        assert_eq!(branch_or(&worker, "trunk").await, "trunk");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_executor_times_out_long_running_commands() {
        let tmp = tempfile::TempDir::new().expect("tempdir should be created");
        let error = ProcessCommandExecutor
            .execute("sleep", &["5".to_string()], tmp.path(), Duration::from_millis(50))
            .await
            .expect_err("sleep should exceed timeout");
        assert_eq!(error.kind(), io::ErrorKind::TimedOut);
    }
}
