// autopushd: watch a working tree and push every change to its remote.

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use autopush_daemon::config::{self, AutoPushConfig, LOG_FILE_NAME};
use autopush_daemon::exit_code::ExitCode;
use clap::Parser;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "autopushd", about = "Commit and push working-tree changes automatically")]
struct Cli {
    /// Repository to watch.
    #[arg(long, short = 'C', default_value = ".")]
    repo: PathBuf,

    /// Config file (defaults to `<repo>/.autopush.toml`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Remote to push to.
    #[arg(long)]
    remote: Option<String>,

    /// Seconds between two push attempts.
    #[arg(long)]
    cooldown: Option<u64>,

    /// Push attempts per cycle.
    #[arg(long)]
    max_retries: Option<u32>,

    /// Seconds to wait between failed push attempts.
    #[arg(long)]
    retry_delay: Option<u64>,

    /// Don't write `.logs/auto-push.log`.
    #[arg(long)]
    no_log_file: bool,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn load_config(&self) -> Result<AutoPushConfig> {
        let mut config = match &self.config {
            Some(path) => AutoPushConfig::load_from(path),
            None => AutoPushConfig::load(&self.repo),
        }
        .context("failed to load configuration")?;

        self.apply_overrides(&mut config);
        config.validate().context("invalid command-line options")?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut AutoPushConfig) {
        if let Some(remote) = &self.remote {
            config.git.remote = remote.clone();
        }
        if let Some(cooldown) = self.cooldown {
            config.push.cooldown_secs = cooldown;
        }
        if let Some(max_retries) = self.max_retries {
            config.push.max_retries = max_retries;
        }
        if let Some(retry_delay) = self.retry_delay {
            config.push.retry_delay_secs = retry_delay;
        }
        if self.no_log_file {
            config.log.file = false;
        }
    }
}

#[tokio::main]
async fn main() -> process::ExitCode {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("autopushd: {err:#}");
            return ExitCode::from_error(&err).into();
        }
    };

    if cli.print_config {
        return match config.to_toml() {
            Ok(text) => {
                print!("{text}");
                ExitCode::Success.into()
            }
            Err(err) => {
                eprintln!("autopushd: {err}");
                ExitCode::Error.into()
            }
        };
    }

    let _log_guard = match init_logging(&cli.repo, config.log.file) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("autopushd: {err:#}");
            return ExitCode::Error.into();
        }
    };

    info!(repo = %cli.repo.display(), "starting auto-push");
    match autopush_daemon::runtime::run(&cli.repo, &config).await {
        Ok(()) => ExitCode::Success.into(),
        Err(err) => {
            error!(error = format!("{err:#}"), "auto-push terminated");
            ExitCode::from_error(&err).into()
        }
    }
}

/// Console logging plus, when enabled, a plain-text file under `<repo>/.logs/`.
fn init_logging(repo: &std::path::Path, to_file: bool) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = if to_file {
        let dir = config::log_dir(repo);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
        let appender = tracing_appender::rolling::never(&dir, LOG_FILE_NAME);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .context("failed to initialize logging")?;

    Ok(guard)
}
