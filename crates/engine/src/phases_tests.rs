// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{shared, task_job, FakeShared};
use jr_adapters::{ArtifactEvent, ArtifactRole, EngineCall, FakeBackend, FakeEngine};
use jr_core::{ArtifactSpec, BuildPolicy, CacheSpec};
use std::time::Duration;
use tempfile::TempDir;

fn job(policy: BuildPolicy) -> Job {
    Job {
        build_policy: policy,
        ..task_job()
    }
}

fn setup(job: Job) -> (TempDir, FakeBackend, FakeEngine, Arc<FakeShared>) {
    let tmp = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(tmp.path());
    let engine = FakeEngine::new();
    let shared = Arc::new(shared(&backend, &engine, tmp.path(), job));
    (tmp, backend, engine, shared)
}

fn spec() -> ContainerSpec {
    ContainerSpec {
        image: "python:3.11".to_string(),
        ..Default::default()
    }
}

/// Stop the job as soon as its container has started
fn stop_once_running(engine: &FakeEngine, shared: &Arc<FakeShared>) {
    let engine = engine.clone();
    let shared = shared.clone();
    tokio::spawn(async move {
        while engine.runs().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shared.stop.stop();
    });
}

#[tokio::test]
async fn container_exiting_cleanly_closes_the_stream() {
    let (_tmp, _backend, engine, shared) = setup(task_job());

    run_container(&shared, &spec(), SharedLog::sink())
        .await
        .unwrap();

    assert!(shared.config.stream.is_closed());
    assert_eq!(engine.stop_count(), 0);
}

#[tokio::test]
async fn non_zero_exit_is_reported() {
    let (_tmp, _backend, engine, shared) = setup(task_job());
    engine.set_exit_code(3);

    let err = run_container(&shared, &spec(), SharedLog::sink())
        .await
        .unwrap_err();

    assert!(matches!(err, ContainerError::Exited { exit_code: 3 }));
}

#[tokio::test]
async fn stop_while_running_stops_the_container_once() {
    let (_tmp, _backend, engine, shared) = setup(task_job());
    engine.block_until_stopped();
    stop_once_running(&engine, &shared);

    run_container(&shared, &spec(), SharedLog::sink())
        .await
        .unwrap();

    assert_eq!(engine.stop_count(), 1);
    assert!(shared.config.stream.is_closed());
}

#[tokio::test]
async fn stop_before_start_runs_nothing() {
    let (_tmp, backend, engine, shared) = setup(job(BuildPolicy::Build));
    shared.stop.stop();

    run_job(shared, ArtifactSet::default()).await.unwrap();

    assert!(engine.calls().is_empty());
    assert!(backend.updates().is_empty());
}

#[tokio::test]
async fn phases_announce_building_then_running() {
    let (tmp, backend, engine, shared) = setup(job(BuildPolicy::Build));
    engine.set_output("epoch 1\n");

    run_job(shared, ArtifactSet::default()).await.unwrap();

    assert_eq!(
        backend.statuses(),
        vec![JobStatus::Building, JobStatus::Running]
    );
    assert_eq!(engine.runs().len(), 1);
    assert!(backend
        .log_contents("/jr/jobs/fake-bucket/repo", "run-a")
        .contains("epoch 1"));
    let local = tmp.path().join("logs/jobs/repo/run-a.log");
    assert!(std::fs::read_to_string(local).unwrap().contains("epoch 1"));
}

#[tokio::test]
async fn build_only_jobs_never_start_a_container() {
    let (_tmp, backend, engine, shared) = setup(job(BuildPolicy::BuildOnly));

    run_job(shared.clone(), ArtifactSet::default()).await.unwrap();

    assert_eq!(engine.build_count(), 1);
    assert!(engine.runs().is_empty());
    assert!(shared.config.stream.is_closed());
    assert_eq!(backend.statuses(), vec![JobStatus::Building]);
    assert_eq!(backend.build_diff_keys().len(), 1);
}

#[tokio::test]
async fn caches_are_downloaded_and_uploaded_around_the_run() {
    let job = Job {
        cache: vec![CacheSpec {
            path: ".cache/pip".to_string(),
        }],
        ..job(BuildPolicy::Build)
    };
    let (_tmp, backend, _engine, shared) = setup(job);

    run_job(shared, ArtifactSet::default()).await.unwrap();

    assert_eq!(
        backend.statuses(),
        vec![
            JobStatus::Downloading,
            JobStatus::Building,
            JobStatus::Running,
            JobStatus::Uploading,
        ]
    );
    let events: Vec<_> = backend
        .artifact_calls()
        .into_iter()
        .filter(|c| c.role == ArtifactRole::Cache)
        .map(|c| c.event)
        .collect();
    assert_eq!(events, vec![ArtifactEvent::BeforeRun, ArtifactEvent::AfterRun]);
}

#[tokio::test]
async fn outputs_are_uploaded_after_a_stop() {
    let job = Job {
        artifacts: vec![ArtifactSpec {
            path: "model".to_string(),
            mount: false,
        }],
        ..job(BuildPolicy::Build)
    };
    let (_tmp, backend, engine, shared) = setup(job.clone());
    let (outputs, live) = crate::resolve::outputs(&backend, &job).await;
    engine.block_until_stopped();
    stop_once_running(&engine, &shared);

    run_job(
        shared,
        ArtifactSet {
            outputs,
            live,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(backend.statuses().last(), Some(&JobStatus::Uploading));
    assert!(backend
        .artifact_calls()
        .iter()
        .any(|c| c.role == ArtifactRole::Output && c.event == ArtifactEvent::AfterRun));
}

#[tokio::test]
async fn checkout_failure_is_a_stage_error() {
    let (_tmp, _backend, engine, shared) = setup(job(BuildPolicy::Build));
    shared.repos.fail_checkout();

    let err = run_job(shared, ArtifactSet::default()).await.unwrap_err();

    assert!(matches!(
        err,
        ExecutorError::Phase {
            phase: Phase::Stage,
            ..
        }
    ));
    assert!(!engine
        .calls()
        .iter()
        .any(|c| matches!(c, EngineCall::Build { .. })));
}

#[tokio::test]
async fn container_failure_is_a_run_error_with_the_exit_code() {
    let (_tmp, _backend, engine, shared) = setup(job(BuildPolicy::Build));
    engine.set_exit_code(2);

    let err = run_job(shared, ArtifactSet::default()).await.unwrap_err();

    assert!(matches!(
        err,
        ExecutorError::Phase {
            phase: Phase::Run,
            ..
        }
    ));
    assert_eq!(err.container_exit_code(), Some(2));
}
