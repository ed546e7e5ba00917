// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job executor
//!
//! Drives one job from claim to a terminal status. The pipeline runs on its
//! own task while [`Executor::run`] races its completion against the
//! control plane's stop flag and the caller's cancellation.

use crate::error::ExecutorError;
use crate::phases::run_job;
use crate::resolve::{self, ArtifactSet};
use crate::runtime::{RuntimeConfig, RuntimeDeps, Shared};
use jr_adapters::{Backend, ContainerEngine, RepoAdapter, SharedLog};
use jr_core::{ErrorCode, Job, JobStatus, Timing};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Environment variable carrying the live log port
pub const LOGS_PORT_ENV: &str = "WS_LOGS_PORT";

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

type JobResult = Result<(), ExecutorError>;

/// Executes a single claimed job
pub struct Executor<B, E, R> {
    shared: Arc<Shared<B, E, R>>,
    artifacts: Mutex<Option<ArtifactSet>>,
}

impl<B, E, R> Executor<B, E, R>
where
    B: Backend,
    E: ContainerEngine,
    R: RepoAdapter,
{
    /// Claim the configured job and resolve its outputs
    pub async fn init(
        deps: RuntimeDeps<B, E, R>,
        config: RuntimeConfig,
    ) -> Result<Self, ExecutorError> {
        let grace = config.runner.timing.fault_grace;
        contain(grace, Self::initialize(deps, config)).await?
    }

    async fn initialize(
        deps: RuntimeDeps<B, E, R>,
        config: RuntimeConfig,
    ) -> Result<Self, ExecutorError> {
        let job = claim(&deps.backend, &config.runner.id, &config.runner.timing).await?;
        tracing::info!(
            run_name = %job.run_name,
            job_id = %job.job_id,
            policy = %job.build_policy,
            "job claimed"
        );

        let group = format!("/jr/runners/{}", deps.backend.bucket());
        let runner_log = match deps.backend.create_logger(&group, &config.runner.id) {
            Ok(sink) => SharedLog::new(sink),
            Err(e) => {
                tracing::warn!(error = %e, "runner log unavailable");
                SharedLog::sink()
            }
        };

        let (outputs, live) = resolve::outputs(&deps.backend, &job).await;
        let hostname = config.runner.hostname.clone();
        let logs_port = config.stream.port();
        let shared = Shared::new(deps, config, job, runner_log);
        shared.update_job(|job| {
            if let Some(hostname) = hostname {
                job.host_name = hostname;
            }
            if let Some(port) = logs_port {
                job.environment
                    .insert(LOGS_PORT_ENV.to_string(), port.to_string());
            }
        });
        shared.push().await?;
        shared.runner_line(&format!("claimed job {}", shared.job().job_id));

        Ok(Self {
            shared: Arc::new(shared),
            artifacts: Mutex::new(Some(ArtifactSet {
                outputs,
                live,
                ..Default::default()
            })),
        })
    }

    /// Snapshot of the job record
    pub fn job(&self) -> Job {
        self.shared.job()
    }

    /// Ask the job to stop; safe to call any number of times
    pub fn stop(&self) {
        self.shared.stop.stop();
    }

    /// Execute the job until it finishes, is stopped, or `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) -> JobResult {
        let artifacts = self
            .artifacts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| ExecutorError::Fault("job already ran".to_string()))?;

        let job = self.shared.job();
        let span = tracing::info_span!(
            "job",
            run_name = %job.run_name,
            job_id = %job.job_id,
            workflow = %job.workflow_name,
        );
        let mut task = tokio::spawn(run_job(self.shared.clone(), artifacts).instrument(span));

        let period = self
            .shared
            .config
            .runner
            .timing
            .stop_poll_interval
            .max(MIN_POLL_INTERVAL);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                joined = &mut task => return self.complete(joined).await,
                _ = cancel.cancelled() => {
                    tracing::info!("cancelled, stopping job");
                    return self.stop_and_wait(task).await;
                }
                _ = ticker.tick() => {
                    match self.shared.backend.check_stop(&self.shared.job()).await {
                        Ok(true) => {
                            tracing::info!("stop requested by the control plane");
                            return self.stop_and_wait(task).await;
                        }
                        Ok(false) => {}
                        Err(e) => tracing::warn!(error = %e, "stop check failed"),
                    }
                }
            }
        }
    }

    /// Release backend resources
    pub async fn shutdown(self) -> Result<(), ExecutorError> {
        let grace = self.shared.config.runner.timing.fault_grace;
        let backend = self.shared.backend.clone();
        let result = contain(grace, async move { backend.shutdown().await }).await?;
        if let Err(e) = &result {
            tracing::error!(error = %e, "backend shutdown failed");
        }
        result.map_err(ExecutorError::from)
    }

    async fn stop_and_wait(&self, task: JoinHandle<JobResult>) -> JobResult {
        self.stop();
        let result = self.settle(task.await).await;
        self.mark_stopped().await;
        result
    }

    async fn complete(&self, joined: Result<JobResult, JoinError>) -> JobResult {
        let result = self.settle(joined).await;

        // A stop raised through `Executor::stop` ends the task without a watcher
        if self.shared.stop.is_stopped() {
            self.mark_stopped().await;
            return result;
        }

        let err = match result {
            Ok(()) => {
                if let Err(e) = self.shared.set_status(JobStatus::Done).await {
                    tracing::error!(error = %e, "failed to push completion");
                }
                return Ok(());
            }
            Err(e) => e,
        };

        match self.shared.backend.is_interrupted().await {
            Ok(true) => {
                tracing::warn!(error = %err, "compute was interrupted, leaving the job to the control plane");
                self.shared.runner_line("compute interrupted");
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => tracing::error!(error = %e, "interruption check failed"),
        }

        tracing::error!(error = %err, "job failed");
        if let Some(code) = err.container_exit_code() {
            self.shared.update_job(|job| {
                job.error_code = Some(ErrorCode::ContainerExitedWithError);
                job.container_exit_code = Some(code);
            });
        }
        if let Err(e) = self.shared.set_status(JobStatus::Failed).await {
            tracing::error!(error = %e, "failed to push failure");
        }
        Err(err)
    }

    /// Unwrap the task result, re-raising a panic after reporting it
    async fn settle(&self, joined: Result<JobResult, JoinError>) -> JobResult {
        match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                self.report_fault().await;
                std::panic::resume_unwind(e.into_panic())
            }
            Err(e) => Err(ExecutorError::Fault(e.to_string())),
        }
    }

    async fn report_fault(&self) {
        tracing::error!("job task panicked");
        self.shared.runner_line("job task panicked");
        if let Err(e) = self.shared.set_status(JobStatus::Failed).await {
            tracing::error!(error = %e, "failed to push failure after fault");
        }
        tokio::time::sleep(self.shared.config.runner.timing.fault_grace).await;
    }

    /// Refetch the record and persist it as stopped
    async fn mark_stopped(&self) {
        let current = self.shared.job();
        let mut job = match self.shared.backend.refetch_job(&current).await {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!(error = %e, "refetch failed, using the local record");
                current
            }
        };
        if job.status.can_advance_to(JobStatus::Stopped) {
            job.status = JobStatus::Stopped;
        } else {
            tracing::warn!(status = %job.status, "job already terminal, not marking stopped");
        }
        self.shared.replace_job(job.clone());
        self.shared
            .runner_line(&format!("job {} is {}", job.job_id, job.status));
        if let Err(e) = self.shared.backend.update_state(&job).await {
            tracing::error!(error = %e, "failed to push stopped status");
        }
    }
}

/// Claim the job, retrying while it is not yet assigned
async fn claim<B: Backend>(backend: &B, job_id: &str, timing: &Timing) -> Result<Job, ExecutorError> {
    let attempts = timing.init_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match backend.init(job_id).await {
            Ok(job) => return Ok(job),
            Err(e) if e.is_retryable() && attempt < attempts => {
                tracing::warn!(attempt, error = %e, "job not ready, retrying");
                tokio::time::sleep(timing.init_retry_delay).await;
            }
            Err(source) => {
                return Err(ExecutorError::Init {
                    attempts: attempt,
                    source,
                })
            }
        }
    }
}

/// Run `fut` on its own task so a panic can be reported before it unwinds
async fn contain<T, F>(grace: Duration, fut: F) -> Result<T, ExecutorError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(value) => Ok(value),
        Err(e) if e.is_panic() => {
            tracing::error!("executor panicked");
            tokio::time::sleep(grace).await;
            std::panic::resume_unwind(e.into_panic())
        }
        Err(e) => Err(ExecutorError::Fault(e.to_string())),
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
