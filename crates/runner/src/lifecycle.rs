// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner lifecycle: config discovery, process lock, logging, startup.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use jr_adapters::{
    DockerEngine, GitAdapter, LocalBackend, StreamServer, TracedEngine, TracedRepoAdapter,
};
use jr_core::{ConfigError, RunnerConfig};
use jr_engine::{Executor, ExecutorError, RuntimeConfig, RuntimeDeps};
use thiserror::Error;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Executor with the concrete adapters (engine and repos wrapped with tracing)
pub type RunnerExecutor =
    Executor<LocalBackend, TracedEngine<DockerEngine>, TracedRepoAdapter<GitAdapter>>;

const DEFAULT_LOG_LEVEL: &str = "info";

/// Paths derived from the config dir
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding `runner.toml`
    pub config_dir: PathBuf,
    /// Lock/PID file
    pub lock_path: PathBuf,
    /// Runner log file
    pub log_path: PathBuf,
}

impl Config {
    pub fn for_dir(config_dir: &Path) -> Self {
        Self {
            config_dir: config_dir.to_path_buf(),
            lock_path: config_dir.join("runner.pid"),
            log_path: config_dir.join("logs").join("runner.log"),
        }
    }
}

/// `~/.jr`
pub fn default_config_dir() -> Result<PathBuf, LifecycleError> {
    dirs::home_dir()
        .map(|home| home.join(".jr"))
        .ok_or(LifecycleError::NoConfigDir)
}

/// Exclusive lock on the PID file, held for the process lifetime
#[derive(Debug)]
pub struct ProcessLock {
    // NOTE(lifetime): the lock is released when the file is dropped
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl ProcessLock {
    pub fn acquire(path: &Path) -> Result<Self, LifecycleError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::options()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        file.try_lock_exclusive()
            .map_err(LifecycleError::LockFailed)?;
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove PID file: {}", e);
        }
    }
}

/// Filter from `--log-level`, then `RUST_LOG`, then `info`
pub fn log_filter(level: Option<&str>) -> Result<EnvFilter, LifecycleError> {
    match level {
        Some(level) => {
            EnvFilter::try_new(level).map_err(|e| LifecycleError::LogFilter(e.to_string()))
        }
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))),
    }
}

pub fn setup_logging(
    config: &Config,
    level: Option<&str>,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*};

    let dir = config.log_path.parent().ok_or(LifecycleError::NoConfigDir)?;
    std::fs::create_dir_all(dir)?;
    let file_appender = tracing_appender::rolling::never(
        dir,
        config
            .log_path
            .file_name()
            .ok_or(LifecycleError::NoConfigDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(log_filter(level)?)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}

/// Load `runner.toml`, wire the adapters and claim the job
pub async fn startup(
    config: &Config,
    stream_port: Option<u16>,
) -> Result<RunnerExecutor, LifecycleError> {
    let runner = RunnerConfig::load(&config.config_dir)?;
    let storage_root = runner.storage_root(&config.config_dir);
    info!(
        job_id = %runner.id,
        storage = %storage_root.display(),
        "starting runner"
    );

    let stream = match stream_port {
        Some(port) => StreamServer::bind(("0.0.0.0", port))
            .await
            .map_err(|e| LifecycleError::BindFailed(port, e))?,
        None => StreamServer::detached(),
    };

    let deps = RuntimeDeps {
        backend: LocalBackend::new(storage_root),
        engine: TracedEngine::new(DockerEngine::default()),
        repos: TracedRepoAdapter::new(GitAdapter::default()),
    };
    let runtime = RuntimeConfig::new(&config.config_dir, runner).with_stream(stream);
    Ok(Executor::init(deps, runtime).await?)
}

/// Cancel `token` on SIGTERM or SIGINT
pub fn cancel_on_signal(token: CancellationToken) -> std::io::Result<JoinHandle<()>> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, stopping job..."),
            _ = sigint.recv() => info!("Received SIGINT, stopping job..."),
            _ = token.cancelled() => return,
        }
        token.cancel();
    }))
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to acquire lock: runner already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Invalid log filter: {0}")]
    LogFilter(String),

    #[error("Failed to bind log stream on port {0}: {1}")]
    BindFailed(u16, std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
