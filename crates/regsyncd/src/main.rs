//! regsyncd
//!
//! Main entry point for the synchronization daemon. Reads the bootstrap
//! config, starts the sync server and runs until SIGINT or SIGTERM.

use anyhow::{anyhow, Context};
use clap::Parser;
use regsyncd::{RegsyncConfig, ServerSettings, SyncServerBuilder, DEFAULT_CONFIG_PATH};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Parser)]
#[command(name = "regsyncd", version, about = "Registry and config-center synchronization daemon")]
struct Cli {
    /// Bootstrap config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log filter, overrides the config file (e.g. "debug" or "regsync_core=trace")
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = RegsyncConfig::load_or_default(&cli.config)?;
    config.validate()?;

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    init_logging(level, cli.json_logs || config.logging.json)?;

    info!(config = %cli.config.display(), "regsyncd: Starting synchronization daemon");

    match run_daemon(&config).await {
        Ok(()) => {
            info!("regsyncd: Daemon exiting normally");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "regsyncd: Daemon exiting with error");
            Err(e)
        }
    }
}

/// Initialize structured logging
///
/// RUST_LOG takes precedence over `level`.
fn init_logging(level: &str, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log filter '{}'", level))?;

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let result = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.compact().finish())
    };
    result.map_err(|e| anyhow!("Failed to set logger: {}", e))
}

async fn run_daemon(config: &RegsyncConfig) -> anyhow::Result<()> {
    let server = SyncServerBuilder::new().build(ServerSettings {
        provider: config.provider_settings(),
        flush_interval: config.flush_interval(),
    });

    server
        .init()
        .await
        .context("failed to start sync server")?;

    wait_for_shutdown().await?;
    info!("regsyncd: Received shutdown signal");

    server.destroy().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("failed to listen for ctrl-c")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")
}
