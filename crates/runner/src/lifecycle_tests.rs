// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use jr_adapters::Backend;
use jr_core::{Job, JobStatus};
use tempfile::tempdir;

#[test]
fn config_paths_live_under_the_config_dir() {
    let config = Config::for_dir(Path::new("/home/ada/.jr"));
    assert_eq!(config.lock_path, PathBuf::from("/home/ada/.jr/runner.pid"));
    assert_eq!(
        config.log_path,
        PathBuf::from("/home/ada/.jr/logs/runner.log")
    );
}

#[test]
fn second_lock_on_the_same_dir_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("runner.pid");

    let lock = ProcessLock::acquire(&path).unwrap();
    let pid = std::fs::read_to_string(&path).unwrap();
    assert_eq!(pid.trim(), std::process::id().to_string());

    assert!(matches!(
        ProcessLock::acquire(&path),
        Err(LifecycleError::LockFailed(_))
    ));

    drop(lock);
    assert!(!path.exists());
    ProcessLock::acquire(&path).unwrap();
}

#[test]
fn explicit_log_level_is_used() {
    assert!(log_filter(Some("debug")).is_ok());
    assert!(log_filter(Some("jr_engine=trace,info")).is_ok());
    assert!(log_filter(None).is_ok());
}

#[tokio::test]
async fn startup_without_runner_config_fails() {
    let dir = tempdir().unwrap();
    let config = Config::for_dir(dir.path());

    let err = startup(&config, None).await.err().unwrap();

    assert!(matches!(
        err,
        LifecycleError::Config(ConfigError::NotFound(_))
    ));
}

#[tokio::test]
async fn startup_claims_the_configured_job() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("runner.toml"),
        "id = \"job-1\"\nhostname = \"node-1\"\n",
    )
    .unwrap();
    let storage = LocalBackend::new(dir.path().join("storage"));
    storage
        .update_state(&Job {
            job_id: "job-1".to_string(),
            run_name: "run-a".to_string(),
            repo_id: "repo".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let executor = startup(&Config::for_dir(dir.path()), None).await.unwrap();

    let job = executor.job();
    assert_eq!(job.run_name, "run-a");
    assert_eq!(job.host_name, "node-1");
    assert_eq!(job.status, JobStatus::Submitted);
    executor.shutdown().await.unwrap();
}
