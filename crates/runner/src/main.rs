// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! jr-runner - executes one provisioned job
//!
//! Claims the job named in `<config-dir>/runner.toml`, runs it to a
//! terminal status and exits.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod lifecycle;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::lifecycle::{default_config_dir, Config, ProcessLock};

#[derive(Parser)]
#[command(name = "jr-runner", version, about = "Job runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Claim and execute the configured job
    Start(StartArgs),
}

#[derive(Args)]
struct StartArgs {
    /// Directory holding runner.toml (default: ~/.jr)
    #[arg(long, env = "JR_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `jr_engine=trace` (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    /// Serve the live job log on this TCP port
    #[arg(long)]
    stream_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Start(args) => start(args).await,
    }
}

async fn start(args: StartArgs) -> Result<()> {
    let config_dir = match args.config_dir {
        Some(dir) => dir,
        None => default_config_dir()?,
    };
    let config = Config::for_dir(&config_dir);

    let _lock = ProcessLock::acquire(&config.lock_path)?;
    let _log_guard = lifecycle::setup_logging(&config, args.log_level.as_deref())?;
    info!("Starting jr-runner in {}", config_dir.display());

    let executor = match lifecycle::startup(&config, args.stream_port).await {
        Ok(executor) => executor,
        Err(e) => {
            error!("Failed to start runner: {}", e);
            return Err(e.into());
        }
    };

    let cancel = CancellationToken::new();
    let signals = lifecycle::cancel_on_signal(cancel.clone())?;

    let result = executor.run(cancel.clone()).await;
    match &result {
        Ok(()) => info!(status = %executor.job().status, "job finished"),
        Err(e) => error!(error = %e, "job failed"),
    }

    let shutdown = executor.shutdown().await;
    cancel.cancel();
    let _ = signals.await;

    result?;
    shutdown?;
    info!("Runner stopped");
    Ok(())
}
