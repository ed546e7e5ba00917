// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn job() -> Job {
    Job {
        job_id: "job-1".to_string(),
        run_name: "run-a".to_string(),
        repo_id: "repo".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn pending_inits_are_retryable_then_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(dir.path());
    backend.add_job(job());
    backend.set_pending_inits(2);

    assert!(backend.init("job-1").await.unwrap_err().is_retryable());
    assert!(backend.init("job-1").await.unwrap_err().is_retryable());
    assert_eq!(backend.init("job-1").await.unwrap().run_name, "run-a");
}

#[tokio::test]
async fn init_error_is_not_retryable() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(dir.path());
    backend.set_init_error("permission denied");
    assert!(!backend.init("job-1").await.unwrap_err().is_retryable());
}

#[tokio::test]
async fn statuses_collapse_repeated_pushes() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(dir.path());
    let mut j = job();
    backend.update_state(&j).await.unwrap();
    j.status = JobStatus::Building;
    backend.update_state(&j).await.unwrap();
    backend.update_state(&j).await.unwrap();
    assert_eq!(
        backend.statuses(),
        vec![JobStatus::Submitted, JobStatus::Building]
    );
    assert_eq!(backend.updates().len(), 3);
}

#[tokio::test]
async fn output_artifacts_sync_to_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(dir.path());
    let art = backend
        .artifact(&ArtifactRequest {
            run_name: "run-a".to_string(),
            local_path: "model".to_string(),
            key: "artifacts/repo/job-1/model".to_string(),
            role: ArtifactRole::Output,
        })
        .await
        .unwrap();

    let mounts = art.bindings("/workflow").unwrap();
    std::fs::write(mounts[0].source.join("w.bin"), "w").unwrap();
    art.after_run().await.unwrap();

    assert!(backend
        .store()
        .path_of("artifacts/repo/job-1/model/w.bin")
        .is_file());
    assert_eq!(
        backend.artifact_calls(),
        vec![ArtifactCall {
            key: "artifacts/repo/job-1/model".to_string(),
            role: ArtifactRole::Output,
            event: ArtifactEvent::AfterRun,
        }]
    );
}

#[tokio::test]
async fn logs_are_captured_per_stream() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(dir.path());
    let mut log = backend.create_logger("/jr/jobs/b/repo", "run-a").unwrap();
    log.write_all(b"hello").unwrap();
    assert_eq!(backend.log_contents("/jr/jobs/b/repo", "run-a"), "hello");
}
