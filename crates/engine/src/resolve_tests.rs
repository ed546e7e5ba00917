// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use jr_adapters::FakeBackend;
use jr_core::{ArtifactSpec, CacheSpec, DepSpec};

fn artifact(path: &str, mount: bool) -> ArtifactSpec {
    ArtifactSpec {
        path: path.to_string(),
        mount,
    }
}

fn job() -> Job {
    Job {
        job_id: "job-2".to_string(),
        run_name: "run-b".to_string(),
        repo_id: "repo".to_string(),
        hub_user_name: "ada".to_string(),
        workflow_name: "train".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn live_artifacts_get_a_second_handle() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(tmp.path());
    let job = Job {
        artifacts: vec![artifact("model", true), artifact("logs", false)],
        ..job()
    };

    let (outputs, live) = outputs(&backend, &job).await;

    assert_eq!(outputs.len(), 2);
    assert_eq!(live.len(), 1);
    let roles: Vec<_> = backend
        .artifact_requests()
        .into_iter()
        .map(|r| (r.key, r.role))
        .collect();
    assert_eq!(
        roles,
        vec![
            ("artifacts/repo/job-2/model".to_string(), ArtifactRole::Output),
            ("artifacts/repo/job-2/model".to_string(), ArtifactRole::Live),
            ("artifacts/repo/job-2/logs".to_string(), ArtifactRole::Output),
        ]
    );
}

#[tokio::test]
async fn caches_are_keyed_by_workflow() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(tmp.path());
    let job = Job {
        cache: vec![CacheSpec {
            path: ".cache/pip".to_string(),
        }],
        ..job()
    };

    let handles = caches(&backend, &job).await;

    assert_eq!(handles.len(), 1);
    assert_eq!(
        backend.artifact_requests()[0].key,
        "cache/repo/ada/train/.cache/pip"
    );
}

#[tokio::test]
async fn dependencies_resolve_every_job_of_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(tmp.path());
    for id in ["dep-1", "dep-2"] {
        backend.add_job(Job {
            job_id: id.to_string(),
            run_name: "run-a".to_string(),
            repo_id: "repo".to_string(),
            artifacts: vec![artifact("data", false)],
            ..Default::default()
        });
    }
    backend.add_job(Job {
        job_id: "other".to_string(),
        run_name: "run-c".to_string(),
        repo_id: "repo".to_string(),
        artifacts: vec![artifact("data", false)],
        ..Default::default()
    });
    let job = Job {
        deps: vec![DepSpec {
            repo_id: "repo".to_string(),
            run_name: "run-a".to_string(),
        }],
        ..job()
    };

    let handles = dependencies(&backend, &job).await.unwrap();

    assert_eq!(handles.len(), 2);
    let requests = backend.artifact_requests();
    assert!(requests.iter().all(|r| r.role == ArtifactRole::Input));
    assert_eq!(requests[0].key, "artifacts/repo/dep-1/data");
    assert_eq!(requests[1].key, "artifacts/repo/dep-2/data");
    assert_eq!(requests[0].run_name, "run-a");
}

#[tokio::test]
async fn bindings_follow_input_output_cache_order() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(tmp.path());
    let job = Job {
        artifacts: vec![artifact("out", false)],
        cache: vec![CacheSpec {
            path: "cache".to_string(),
        }],
        ..job()
    };
    let (outputs, _) = outputs(&backend, &job).await;
    let set = ArtifactSet {
        outputs,
        caches: caches(&backend, &job).await,
        ..Default::default()
    };

    let targets: Vec<_> = set
        .bindings("/workflow")
        .unwrap()
        .into_iter()
        .map(|m| m.target)
        .collect();

    assert_eq!(targets, vec!["/workflow/out", "/workflow/cache"]);
    assert!(set.needs_download());
    assert!(set.needs_upload());
}

#[test]
fn empty_set_moves_nothing() {
    let set = ArtifactSet::default();
    assert!(!set.needs_download());
    assert!(!set.needs_upload());
}
