// Configuration for the auto-push daemon.
//
// Optional file: `<repo>/.autopush.toml`. Every field has a default, so a
// missing file or a partial one is fine. CLI flags override file values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::git::orchestrator::PushPolicy;

pub const CONFIG_FILE_NAME: &str = ".autopush.toml";
/// Log directory under the repository root.
pub const LOG_DIR_NAME: &str = ".logs";
pub const LOG_FILE_NAME: &str = "auto-push.log";

/// Path to the config file: `<root>/.autopush.toml`.
pub fn config_path(repo_root: &Path) -> PathBuf {
    repo_root.join(CONFIG_FILE_NAME)
}

/// Directory the log file is written to: `<root>/.logs`.
pub fn log_dir(repo_root: &Path) -> PathBuf {
    repo_root.join(LOG_DIR_NAME)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct AutoPushConfig {
    pub git: GitConfig,
    pub push: PushConfig,
    pub watch: WatchConfig,
    pub log: LogConfig,
}

impl AutoPushConfig {
    /// Load `<root>/.autopush.toml`, or defaults when the file doesn't exist.
    pub fn load(repo_root: &Path) -> Result<Self, ConfigError> {
        let path = config_path(repo_root);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load and validate a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.git.remote.trim().is_empty() {
            return Err(ConfigError::Invalid("git.remote must not be empty".into()));
        }
        if self.git.fallback_branch.trim().is_empty() {
            return Err(ConfigError::Invalid("git.fallback_branch must not be empty".into()));
        }
        if self.git.command_timeout_secs == 0 {
            return Err(ConfigError::Invalid("git.command_timeout_secs must be at least 1".into()));
        }
        if self.push.max_retries == 0 {
            return Err(ConfigError::Invalid("push.max_retries must be at least 1".into()));
        }
        if self.push.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("push.tick_interval_ms must be at least 1".into()));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn push_policy(&self) -> PushPolicy {
        PushPolicy {
            cooldown: Duration::from_secs(self.push.cooldown_secs),
            max_retries: self.push.max_retries,
            retry_delay: Duration::from_secs(self.push.retry_delay_secs),
            remote: self.git.remote.clone(),
            fallback_branch: self.git.fallback_branch.clone(),
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.git.command_timeout_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.push.tick_interval_ms)
    }
}

/// Git backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GitConfig {
    /// Remote pushed to and checked at startup (defaults to `"origin"`).
    pub remote: String,
    /// Branch used when the current branch can't be resolved (defaults to `"main"`).
    pub fallback_branch: String,
    /// Upper bound for any single git invocation.
    pub command_timeout_secs: u64,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self { remote: "origin".into(), fallback_branch: "main".into(), command_timeout_secs: 30 }
    }
}

/// Push scheduling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PushConfig {
    /// Minimum seconds between two push attempts.
    pub cooldown_secs: u64,
    /// Push attempts per cycle, including the first.
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    /// How often pending changes are checked.
    pub tick_interval_ms: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self { cooldown_secs: 10, max_retries: 3, retry_delay_secs: 10, tick_interval_ms: 1000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Path substrings ignored in addition to `.git`, `.logs` and
    /// `.auto-push.log`, which are always ignored.
    pub extra_ignore_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Also write logs to `<root>/.logs/auto-push.log`.
    pub file: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { file: true }
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::ChangeTracker;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AutoPushConfig::default();
        assert_eq!(cfg.git.remote, "origin");
        assert_eq!(cfg.git.fallback_branch, "main");
        assert_eq!(cfg.command_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.push.cooldown_secs, 10);
        assert_eq!(cfg.push.max_retries, 3);
        assert_eq!(cfg.push.retry_delay_secs, 10);
        assert_eq!(cfg.tick_interval(), Duration::from_secs(1));
        assert!(cfg.watch.extra_ignore_patterns.is_empty());
        assert!(cfg.log.file);
        cfg.validate().expect("defaults should be valid");
    }

    #[test]
    fn push_policy_reflects_config() {
        let mut cfg = AutoPushConfig::default();
        cfg.git.remote = "mirror".into();
        cfg.git.fallback_branch = "trunk".into();
        cfg.push.cooldown_secs = 3;
        cfg.push.retry_delay_secs = 7;
        cfg.push.max_retries = 5;

        let policy = cfg.push_policy();
        assert_eq!(policy.remote, "mirror");
        assert_eq!(policy.fallback_branch, "trunk");
        assert_eq!(policy.cooldown, Duration::from_secs(3));
        assert_eq!(policy.retry_delay, Duration::from_secs(7));
        assert_eq!(policy.max_retries, 5);
    }

    #[test]
    fn default_push_policy_matches_default_config() {
        assert_eq!(AutoPushConfig::default().push_policy(), PushPolicy::default());
    }

    #[test]
    fn parse_full_toml() {
        let toml_str = r#"
[git]
remote = "deploy"
fallback_branch = "master"
command_timeout_secs = 60

[push]
cooldown_secs = 30
max_retries = 5
retry_delay_secs = 2
tick_interval_ms = 250

[watch]
extra_ignore_patterns = ["node_modules", "dist"]

[log]
file = false
"#;
        let cfg: AutoPushConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.git.remote, "deploy");
        assert_eq!(cfg.git.command_timeout_secs, 60);
        assert_eq!(cfg.push.max_retries, 5);
        assert_eq!(cfg.tick_interval(), Duration::from_millis(250));
        assert_eq!(cfg.watch.extra_ignore_patterns, vec!["node_modules", "dist"]);
        assert!(!cfg.log.file);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg: AutoPushConfig = toml::from_str("[push]\ncooldown_secs = 60\n").unwrap();
        assert_eq!(cfg.push.cooldown_secs, 60);
        assert_eq!(cfg.push.max_retries, 3);
        assert_eq!(cfg.git, GitConfig::default());
    }

    #[test]
    fn extra_ignore_patterns_keep_builtin_ignores() {
        let cfg: AutoPushConfig =
            toml::from_str("[watch]\nextra_ignore_patterns = [\"node_modules\"]\n").unwrap();
        let tracker = ChangeTracker::new(cfg.watch.extra_ignore_patterns.iter().cloned());

        assert!(tracker.is_ignored(Path::new("node_modules/left-pad/index.js")));
        assert!(tracker.is_ignored(Path::new(".git/index")));
        assert!(tracker.is_ignored(Path::new(".logs/auto-push.log")));
        assert!(!tracker.is_ignored(Path::new("index.html")));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let error = toml::from_str::<AutoPushConfig>("[push]\ncooldown = 5\n")
            .expect_err("parse should fail");
        assert!(error.to_string().contains("unknown field `cooldown`"));
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = AutoPushConfig::load(dir.path()).unwrap();
        assert_eq!(cfg, AutoPushConfig::default());
    }

    #[test]
    fn load_reads_repo_config_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(config_path(dir.path()), "[git]\nremote = \"upstream\"\n").unwrap();

        let cfg = AutoPushConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.git.remote, "upstream");
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[push]\nmax_retries = 0\n").unwrap();

        let error = AutoPushConfig::load_from(&path).expect_err("zero retries is invalid");
        assert!(matches!(error, ConfigError::Invalid(_)));
    }

    #[test]
    fn load_from_missing_path_is_io_error() {
        let dir = TempDir::new().unwrap();
        let error = AutoPushConfig::load_from(&dir.path().join("missing.toml"))
            .expect_err("missing explicit file should fail");
        assert!(matches!(error, ConfigError::Io { .. }));
    }

    #[test]
    fn to_toml_roundtrips() {
        let mut cfg = AutoPushConfig::default();
        cfg.push.cooldown_secs = 42;
        let text = cfg.to_toml().unwrap();
        let parsed: AutoPushConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn paths_are_under_repo_root() {
        let root = PathBuf::from("/srv/site");
        assert_eq!(config_path(&root), PathBuf::from("/srv/site/.autopush.toml"));
        assert_eq!(log_dir(&root), PathBuf::from("/srv/site/.logs"));
    }
}
