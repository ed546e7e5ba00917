// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{shared, task_job};
use jr_adapters::{EngineCall, FakeBackend, FakeEngine};
use std::collections::BTreeMap;

fn run_spec(job: &Job) -> ContainerSpec {
    ContainerSpec {
        image: job.image.clone(),
        work_dir: "/workflow".to_string(),
        ..Default::default()
    }
}

fn policy_job(policy: BuildPolicy) -> Job {
    Job {
        build_policy: policy,
        ..task_job()
    }
}

#[test]
fn build_spec_excludes_run_constants() {
    let job = Job {
        environment: BTreeMap::from([("A".to_string(), "1".to_string())]),
        optional_build_commands: vec!["pip install extras".to_string()],
        ..task_job()
    };
    let spec = build_spec(&job, &run_spec(&job), Path::new("/tmp/x"), &HashMap::new());

    assert_eq!(spec.base_image, "python:3.11");
    assert_eq!(spec.env, vec!["A=1".to_string()]);
    assert_eq!(
        spec.commands,
        vec![
            "/bin/sh",
            "-c",
            "pip install -r requirements.txt && pip install extras"
        ]
    );
}

#[test]
fn docker_build_receives_one_shell_invocation() {
    let job = Job {
        optional_build_commands: vec!["pip install extras".to_string()],
        ..task_job()
    };
    let spec = build_spec(&job, &run_spec(&job), Path::new("/tmp/x"), &HashMap::new());
    let args = jr_adapters::container::build_args(&spec, "jr-build-1");

    assert!(args.windows(2).any(|w| w == ["--entrypoint", "/bin/sh"]));
    let image = args.iter().position(|a| a == "python:3.11").unwrap();
    assert_eq!(
        &args[image + 1..],
        ["-c", "pip install -r requirements.txt && pip install extras"]
    );
}

#[test]
fn build_identity_ignores_the_run_name() {
    let a = task_job();
    let b = Job {
        run_name: "run-z".to_string(),
        job_id: "job-9".to_string(),
        ..task_job()
    };
    let digest = |job: &Job| {
        build_spec(job, &run_spec(job), Path::new("/tmp/x"), &HashMap::new()).digest()
    };
    assert_eq!(digest(&a), digest(&b));
}

#[tokio::test]
async fn cloud_miss_builds_and_stores_the_diff() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(tmp.path());
    let engine = FakeEngine::new();
    let job = policy_job(BuildPolicy::Build);
    let shared = shared(&backend, &engine, tmp.path(), job.clone());
    let mut spec = run_spec(&job);

    build_or_reuse(&shared, &mut spec, SharedLog::sink())
        .await
        .unwrap();

    assert_eq!(engine.build_count(), 1);
    assert!(spec.image.starts_with("jr/build:"));
    let digest = spec.image.trim_start_matches("jr/build:");
    assert!(backend.has_build_diff(&diff_key(&job, digest)));
}

#[tokio::test]
async fn stored_diff_is_imported_instead_of_building() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(tmp.path());
    let job = policy_job(BuildPolicy::UseBuild);

    let first = FakeEngine::new();
    let mut first_spec = run_spec(&job);
    build_or_reuse(
        &shared(&backend, &first, tmp.path(), policy_job(BuildPolicy::Build)),
        &mut first_spec,
        SharedLog::sink(),
    )
    .await
    .unwrap();

    let second = FakeEngine::new();
    let mut spec = run_spec(&job);
    build_or_reuse(
        &shared(&backend, &second, tmp.path(), job),
        &mut spec,
        SharedLog::sink(),
    )
    .await
    .unwrap();

    assert_eq!(second.build_count(), 0);
    assert!(second
        .calls()
        .iter()
        .any(|c| matches!(c, EngineCall::ImportDiff { .. })));
    assert!(second.has_image(&spec.image));
    assert_eq!(spec.image, first_spec.image);
}

#[tokio::test]
async fn local_target_reuses_the_daemon_image() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(tmp.path());
    backend.set_local(true);
    let engine = FakeEngine::new();
    let job = policy_job(BuildPolicy::Build);
    let shared = shared(&backend, &engine, tmp.path(), job.clone());
    let expected = image_name(&build_spec(&job, &run_spec(&job), &shared.job_dir(&job), &HashMap::new()).digest());
    engine.add_image(&expected);

    let mut spec = run_spec(&job);
    build_or_reuse(&shared, &mut spec, SharedLog::sink())
        .await
        .unwrap();

    assert_eq!(spec.image, expected);
    assert_eq!(engine.build_count(), 0);
    assert!(backend.build_diff_keys().is_empty());
}

#[tokio::test]
async fn local_target_does_not_store_diffs() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(tmp.path());
    backend.set_local(true);
    let engine = FakeEngine::new();
    let job = policy_job(BuildPolicy::ForceBuild);

    let mut spec = run_spec(&job);
    build_or_reuse(
        &shared(&backend, &engine, tmp.path(), job),
        &mut spec,
        SharedLog::sink(),
    )
    .await
    .unwrap();

    assert_eq!(engine.build_count(), 1);
    assert!(backend.build_diff_keys().is_empty());
    assert!(!engine
        .calls()
        .iter()
        .any(|c| matches!(c, EngineCall::ExportDiff { .. })));
}

#[tokio::test]
async fn use_build_miss_with_mandatory_commands_is_build_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(tmp.path());
    let engine = FakeEngine::new();
    let job = policy_job(BuildPolicy::UseBuild);
    let shared = shared(&backend, &engine, tmp.path(), job.clone());

    let err = build_or_reuse(&shared, &mut run_spec(&job), SharedLog::sink())
        .await
        .unwrap_err();

    assert!(err.is_build_not_found());
    assert_eq!(engine.build_count(), 0);
    assert_eq!(
        backend.last_update().unwrap().error_code,
        Some(ErrorCode::BuildNotFound)
    );
}

#[tokio::test]
async fn use_build_miss_with_optional_commands_runs_the_base_image() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(tmp.path());
    let engine = FakeEngine::new();
    let job = Job {
        build_commands: Vec::new(),
        optional_build_commands: vec!["pip install extras".to_string()],
        ..policy_job(BuildPolicy::UseBuild)
    };
    let mut spec = run_spec(&job);

    build_or_reuse(
        &shared(&backend, &engine, tmp.path(), job),
        &mut spec,
        SharedLog::sink(),
    )
    .await
    .unwrap();

    assert_eq!(spec.image, "python:3.11");
    assert_eq!(engine.build_count(), 0);
}

#[tokio::test]
async fn force_build_skips_the_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(tmp.path());
    let seed = FakeEngine::new();
    build_or_reuse(
        &shared(&backend, &seed, tmp.path(), policy_job(BuildPolicy::Build)),
        &mut run_spec(&task_job()),
        SharedLog::sink(),
    )
    .await
    .unwrap();

    let engine = FakeEngine::new();
    let job = policy_job(BuildPolicy::ForceBuild);
    build_or_reuse(
        &shared(&backend, &engine, tmp.path(), job.clone()),
        &mut run_spec(&job),
        SharedLog::sink(),
    )
    .await
    .unwrap();

    assert_eq!(engine.build_count(), 1);
    assert!(!engine
        .calls()
        .iter()
        .any(|c| matches!(c, EngineCall::ImportDiff { .. })));
}

#[tokio::test]
async fn stop_before_the_build_starts_is_a_stop() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(tmp.path());
    let engine = FakeEngine::new();
    let job = policy_job(BuildPolicy::ForceBuild);
    let shared = shared(&backend, &engine, tmp.path(), job.clone());
    shared.stop.stop();

    let err = build_or_reuse(&shared, &mut run_spec(&job), SharedLog::sink())
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutorError::Stopped));
    assert_eq!(engine.build_count(), 0);
}

#[tokio::test]
async fn build_failure_is_a_build_phase_error() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(tmp.path());
    let engine = FakeEngine::new();
    engine.set_build_failure(2);
    let job = policy_job(BuildPolicy::ForceBuild);

    let err = build_or_reuse(
        &shared(&backend, &engine, tmp.path(), job.clone()),
        &mut run_spec(&job),
        SharedLog::sink(),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        ExecutorError::Phase {
            phase: Phase::Build,
            ..
        }
    ));
    assert_eq!(err.container_exit_code(), None);
}
