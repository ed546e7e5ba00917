// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for unit tests

use crate::runtime::{RuntimeConfig, RuntimeDeps, Shared};
use jr_adapters::{FakeBackend, FakeEngine, FakeRepoAdapter, SharedLog};
use jr_core::{Job, RunnerConfig};
use std::path::Path;

pub(crate) type FakeShared = Shared<FakeBackend, FakeEngine, FakeRepoAdapter>;

pub(crate) fn shared(
    backend: &FakeBackend,
    engine: &FakeEngine,
    config_dir: &Path,
    job: Job,
) -> FakeShared {
    let runner = RunnerConfig {
        id: job.job_id.clone(),
        hostname: Some("node-1".to_string()),
        ..Default::default()
    };
    Shared::new(
        RuntimeDeps {
            backend: backend.clone(),
            engine: engine.clone(),
            repos: FakeRepoAdapter::new(),
        },
        RuntimeConfig::new(config_dir, runner),
        job,
        SharedLog::sink(),
    )
}

/// A task job with one mandatory build command
pub(crate) fn task_job() -> Job {
    Job {
        job_id: "job-1".to_string(),
        run_name: "run-a".to_string(),
        workflow_name: "train".to_string(),
        repo_id: "repo".to_string(),
        image: "python:3.11".to_string(),
        build_commands: vec!["pip install -r requirements.txt".to_string()],
        commands: vec!["python train.py".to_string()],
        ..Default::default()
    }
}
