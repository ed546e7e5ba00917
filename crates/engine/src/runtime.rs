// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Executor dependencies and the state shared with the job task

use jr_adapters::{Backend, ContainerEngine, RepoAdapter, SharedLog, StreamServer};
use jr_core::{Job, JobStatus, RunnerConfig};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::ExecutorError;
use crate::stop::StopSignal;

/// Runtime dependencies
#[derive(Clone)]
pub struct RuntimeDeps<B, E, R> {
    pub backend: B,
    pub engine: E,
    pub repos: R,
}

/// Runtime configuration
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Directory holding `runner.toml` and the local log files
    pub config_dir: PathBuf,
    pub runner: RunnerConfig,
    /// Live log stream; a detached server when streaming is disabled
    pub stream: StreamServer,
}

impl RuntimeConfig {
    pub fn new(config_dir: impl Into<PathBuf>, runner: RunnerConfig) -> Self {
        Self {
            config_dir: config_dir.into(),
            runner,
            stream: StreamServer::detached(),
        }
    }

    pub fn with_stream(mut self, stream: StreamServer) -> Self {
        self.stream = stream;
        self
    }
}

/// State shared between the executor and its job task
pub(crate) struct Shared<B, E, R> {
    pub backend: B,
    pub engine: E,
    pub repos: R,
    pub config: RuntimeConfig,
    pub stop: StopSignal,
    /// Runner-level log in the backend's log service
    pub runner_log: SharedLog,
    job: Mutex<Job>,
}

impl<B, E, R> Shared<B, E, R>
where
    B: Backend,
    E: ContainerEngine,
    R: RepoAdapter,
{
    pub fn new(deps: RuntimeDeps<B, E, R>, config: RuntimeConfig, job: Job, runner_log: SharedLog) -> Self {
        Self {
            backend: deps.backend,
            engine: deps.engine,
            repos: deps.repos,
            config,
            stop: StopSignal::new(),
            runner_log,
            job: Mutex::new(job),
        }
    }

    /// Snapshot of the job record
    pub fn job(&self) -> Job {
        self.job.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Apply `f` to the job record and return the updated snapshot
    pub fn update_job(&self, f: impl FnOnce(&mut Job)) -> Job {
        let mut job = self.job.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut job);
        job.clone()
    }

    pub fn replace_job(&self, job: Job) {
        *self.job.lock().unwrap_or_else(|e| e.into_inner()) = job;
    }

    /// Push the current job record
    pub async fn push(&self) -> Result<(), ExecutorError> {
        let job = self.job();
        self.backend.update_state(&job).await?;
        Ok(())
    }

    /// Transition the job and persist it before the phase's work begins
    pub async fn set_status(&self, status: JobStatus) -> Result<(), ExecutorError> {
        let mut moved = false;
        let job = self.update_job(|job| {
            if job.status.can_advance_to(status) {
                job.status = status;
                moved = true;
            }
        });
        if !moved {
            tracing::warn!(from = %job.status, to = %status, "ignoring status transition");
            return Ok(());
        }
        tracing::info!(status = %status, "job status");
        self.runner_line(&format!("job {} is {}", job.job_id, status));
        self.backend.update_state(&job).await?;
        Ok(())
    }

    /// Append a line to the runner log
    pub fn runner_line(&self, line: &str) {
        let mut log = self.runner_log.clone();
        if let Err(e) = writeln!(log, "{line}") {
            tracing::warn!(error = %e, "runner log write failed");
        }
    }

    /// Per-job scratch directory the repository is staged into
    pub fn job_dir(&self, job: &Job) -> PathBuf {
        self.runs_dir(job).join(&job.job_id)
    }

    pub fn runs_dir(&self, job: &Job) -> PathBuf {
        self.backend.tmp_dir().join("runs").join(&job.run_name)
    }
}
