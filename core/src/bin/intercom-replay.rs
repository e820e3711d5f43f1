//! `intercom-replay`: send the calls queued in the deferred log.
//!
//! Usage:
//!   intercom-replay [--config <file.toml>] [--log <path>]
//!
//! Without `--config` the settings come from `INTERCOM_*` environment
//! variables. Meant to run from cron.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use intercom_core::{ClientConfig, Messenger, UreqTransport};
use tracing::{error, info};

/// Replay deferred Intercom calls.
#[derive(Parser, Debug)]
#[command(name = "intercom-replay", about = "Replay deferred Intercom calls")]
struct Cli {
    /// TOML config file (defaults to INTERCOM_* environment variables).
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Deferred log to drain (overrides the configured path).
    #[arg(long = "log")]
    log: Option<PathBuf>,
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            ClientConfig::load_from_file(path)?
        }
        None => ClientConfig::load_from_env()?,
    };
    if let Some(log) = cli.log {
        config.delayed_log = log;
    }

    let mut messenger = Messenger::new(config, UreqTransport::new());
    info!(log = %messenger.queue().path().display(), "replaying deferred calls");
    let report = messenger.replay_deferred();

    match &report.aborted {
        Some(err) => {
            error!(handled = report.handled, error = %err, "replay aborted");
            Ok(ExitCode::FAILURE)
        }
        None => {
            info!(
                handled = report.handled,
                skipped = report.skipped,
                failed = report.failed,
                "replay complete"
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}
