mod cli;
mod runner;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dapc_config::load_config;
use dapc_platform::logging::{default_log_file_path, log_level_to_filter, open_log_file};
use dapc_platform::paths::{DefaultPaths, PlatformPaths};

use crate::cli::Cli;

/// Send tracing output to `log_path`; stdout belongs to the debuggee.
///
/// `--log-level` wins over `RUST_LOG`, which wins over the configured level.
fn init_logging(log_path: &Path, cli_level: Option<&str>, config_level: &str) {
    let filter = match cli_level {
        Some(level) => EnvFilter::new(log_level_to_filter(level)),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(log_level_to_filter(config_level))),
    };
    match open_log_file(log_path) {
        Ok(file) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        Err(e) => eprintln!("dapc: logging disabled: {}: {e}", log_path.display()),
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let paths = DefaultPaths::new().context("failed to detect platform paths")?;
    let config_dir = cli.config_dir.clone().unwrap_or_else(|| paths.config_dir());
    let project_dir = std::env::current_dir().ok();
    let loaded = load_config(&config_dir, project_dir.as_deref());

    let (config, config_error) = match loaded {
        Ok(config) => (config, None),
        Err(e) => (dapc_config::Config::default(), Some(e)),
    };
    let log_path = config
        .log
        .file
        .clone()
        .unwrap_or_else(|| default_log_file_path(&paths));
    init_logging(&log_path, cli.log_level.as_deref(), config.log.level.as_str());

    if let Some(e) = config_error {
        // A broken config is fatal; the defaults only kept logging alive.
        error!("config load failed: {}", e);
        return Err(e).context("failed to load configuration");
    }
    info!(config_dir = %config_dir.display(), "dapc starting");

    runner::run(&cli, &config).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("dapc: {:#}", e);
            std::process::exit(1);
        }
    }
}
