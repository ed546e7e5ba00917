// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job pipeline.
//!
//! Phases run strictly in sequence inside the job task. Each status is
//! persisted before the work it announces begins, and a stop is honored
//! between phases and while the container runs.

use crate::build::build_or_reuse;
use crate::error::{ExecutorError, Phase, PhaseExt, StepError};
use crate::resolve::{self, ArtifactSet};
use crate::runspec::{self, CredentialsFile};
use crate::runtime::Shared;
use crate::stage::stage_repository;
use jr_adapters::logs::open_local_log;
use jr_adapters::{Backend, ContainerEngine, ContainerError, FanOut, LogSink, RepoAdapter, SharedLog};
use jr_core::{ContainerSpec, Job, JobStatus};
use std::io::Write;
use std::sync::Arc;

const PULL_WARNING: &str = "Pulling a docker image. This may take a while...";

/// Run every phase of the job; a stop observed at a checkpoint is `Ok`
pub(crate) async fn run_job<B, E, R>(
    shared: Arc<Shared<B, E, R>>,
    artifacts: ArtifactSet,
) -> Result<(), ExecutorError>
where
    B: Backend,
    E: ContainerEngine,
    R: RepoAdapter,
{
    match pipeline(&shared, artifacts).await {
        Err(ExecutorError::Stopped) => {
            tracing::info!("job stopped at a checkpoint");
            Ok(())
        }
        result => result,
    }
}

async fn pipeline<B, E, R>(
    shared: &Shared<B, E, R>,
    mut artifacts: ArtifactSet,
) -> Result<(), ExecutorError>
where
    B: Backend,
    E: ContainerEngine,
    R: RepoAdapter,
{
    let job = shared.job();
    let job_dir = shared.job_dir(&job);
    let runs_container = job.build_policy.runs_container();

    stage_repository(&shared.backend, &shared.repos, &job, &job_dir)
        .await
        .phase(Phase::Stage)?;
    shared.stop.checkpoint()?;

    if runs_container {
        artifacts.caches = resolve::caches(&shared.backend, &job).await;
        artifacts.inputs = resolve::dependencies(&shared.backend, &job)
            .await
            .phase(Phase::Resolve)?;
        for handle in &artifacts.live {
            handle.before_run().await.phase(Phase::Mount)?;
        }
        if artifacts.needs_download() {
            shared.set_status(JobStatus::Downloading).await?;
            for handle in artifacts.inputs.iter().chain(artifacts.caches.iter()) {
                handle.before_run().await.phase(Phase::Download)?;
            }
        }
        shared.stop.checkpoint()?;
    }

    let credentials = CredentialsFile::new(shared.runs_dir(&job).join("credentials"));
    let mut spec = runspec::assemble(shared, &artifacts, &credentials).await?;
    let logs = open_job_logs(shared, &job).phase(Phase::Logs)?;

    if shared.backend.is_local() {
        warn_on_pull(shared, &spec).await;
    }

    shared.stop.checkpoint()?;
    shared.set_status(JobStatus::Building).await?;
    build_or_reuse(shared, &mut spec, logs.clone()).await?;

    if !runs_container {
        tracing::info!("build-only job, not running");
        shared.config.stream.close();
        return Ok(());
    }

    shared.stop.checkpoint()?;
    shared.set_status(JobStatus::Running).await?;
    run_container(shared, &spec, logs).await.phase(Phase::Run)?;

    // Outputs are persisted on a graceful stop too
    if artifacts.needs_upload() {
        shared.set_status(JobStatus::Uploading).await?;
        for handle in artifacts.outputs.iter().chain(artifacts.caches.iter()) {
            handle.after_run().await.phase(Phase::Upload)?;
        }
    }
    for handle in &artifacts.live {
        handle.after_run().await.phase(Phase::Unmount)?;
    }
    Ok(())
}

/// Fan-out of the backend job log, the local log file and the live stream
fn open_job_logs<B, E, R>(shared: &Shared<B, E, R>, job: &Job) -> Result<SharedLog, StepError>
where
    B: Backend,
    E: ContainerEngine,
    R: RepoAdapter,
{
    let group = format!("/jr/jobs/{}/{}", shared.backend.bucket(), job.repo_id);
    let cloud = shared.backend.create_logger(&group, &job.run_name)?;
    let local_dir = shared
        .config
        .config_dir
        .join("logs")
        .join("jobs")
        .join(&job.repo_id);
    let local = open_local_log(&local_dir, &job.run_name)?;
    let sinks: Vec<LogSink> = vec![
        cloud,
        Box::new(local),
        Box::new(shared.config.stream.writer()),
    ];
    Ok(SharedLog::new(FanOut::new(sinks)))
}

async fn warn_on_pull<B, E, R>(shared: &Shared<B, E, R>, spec: &ContainerSpec)
where
    B: Backend,
    E: ContainerEngine,
    R: RepoAdapter,
{
    match shared.engine.image_exists(&spec.image).await {
        Ok(true) => {}
        Ok(false) => {
            let _ = writeln!(shared.config.stream.writer(), "{PULL_WARNING}");
        }
        Err(e) => tracing::warn!(error = %e, "image lookup failed"),
    }
}

/// Start the container and wait for it to exit or for a stop.
///
/// The waiter always closes the live stream. A stop issues one container
/// stop and returns cleanly.
pub(crate) async fn run_container<B, E, R>(
    shared: &Shared<B, E, R>,
    spec: &ContainerSpec,
    logs: SharedLog,
) -> Result<(), ContainerError>
where
    B: Backend,
    E: ContainerEngine,
    R: RepoAdapter,
{
    let id = shared.engine.run(spec, logs).await?;

    let engine = shared.engine.clone();
    let stream = shared.config.stream.clone();
    let wait_id = id.clone();
    let mut waiter = tokio::spawn(async move {
        let result = engine.wait(&wait_id).await;
        stream.close();
        result
    });

    tokio::select! {
        joined = &mut waiter => match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(ContainerError::CommandFailed(e.to_string())),
        },
        _ = shared.stop.stopped() => {
            tracing::info!(container = %id, "stopping container");
            shared.engine.stop(&id).await?;
            // The exit status after a stop is not a job failure
            if let Err(e) = waiter.await {
                tracing::warn!(error = %e, "container waiter failed");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "phases_tests.rs"]
mod tests;
