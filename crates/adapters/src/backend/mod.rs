// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution backend adapters
//!
//! A backend is everything the runner needs from the environment it was
//! provisioned in: the job record, durable storage, secrets and log sinks.

mod local;

pub use local::LocalBackend;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{ArtifactCall, ArtifactEvent, FakeBackend};

use crate::artifacts::Artifacter;
use crate::logs::LogSink;
use async_trait::async_trait;
use jr_core::{GitCredentials, Job, Mount, Requirements};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from backend operations
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("job {0} is not assigned yet")]
    JobNotAssigned(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("malformed record {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("archive {name} failed to unpack: {message}")]
    Archive { name: String, message: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    /// Whether initialization should be attempted again
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::JobNotAssigned(_))
    }
}

/// What a resolved handle is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactRole {
    /// A dependency's output, pulled before run
    Input,
    /// This job's output, pushed after run
    Output,
    /// An output synced while the container runs
    Live,
    /// A workflow cache, pulled before and pushed after
    Cache,
}

/// Request for an artifact handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRequest {
    /// Run owning the local copy
    pub run_name: String,
    /// Path declared by the job, relative to its working dir
    pub local_path: String,
    /// Storage key
    pub key: String,
    pub role: ArtifactRole,
}

/// Capabilities the executor consumes from its environment
#[async_trait]
pub trait Backend: Clone + Send + Sync + 'static {
    /// Claim the job the runner was provisioned for
    async fn init(&self, job_id: &str) -> Result<Job, BackendError>;

    /// Current remote copy of the job record
    async fn refetch_job(&self, job: &Job) -> Result<Job, BackendError>;

    /// Push the job record
    async fn update_state(&self, job: &Job) -> Result<(), BackendError>;

    /// Whether the control plane asked the job to stop
    async fn check_stop(&self, job: &Job) -> Result<bool, BackendError>;

    /// Whether the underlying compute was preempted
    async fn is_interrupted(&self) -> Result<bool, BackendError>;

    /// Whether this is the local compute target
    fn is_local(&self) -> bool;

    /// Resolve a handle; `None` when the backend has no viable location
    async fn artifact(&self, request: &ArtifactRequest) -> Option<Box<dyn Artifacter>>;

    /// Keys directly under `prefix`
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, BackendError>;

    /// Job record stored at `key`
    async fn job_by_path(&self, key: &str) -> Result<Job, BackendError>;

    async fn master_job(&self, job: &Job) -> Result<Option<Job>, BackendError>;

    async fn secrets(&self, job: &Job) -> Result<HashMap<String, String>, BackendError>;

    async fn git_credentials(&self, job: &Job) -> Result<Option<GitCredentials>, BackendError>;

    /// Uncommitted diff uploaded for the job
    async fn repo_diff(&self, job: &Job, filename: &str) -> Result<String, BackendError>;

    /// Unpack the job's source archive into `dst`
    async fn repo_archive(&self, job: &Job, filename: &str, dst: &Path)
        -> Result<(), BackendError>;

    /// Fetch the build diff at `key` into `dst`; `false` when none is stored
    async fn build_diff(&self, key: &str, dst: &Path) -> Result<bool, BackendError>;

    async fn put_build_diff(&self, src: &Path, key: &str) -> Result<(), BackendError>;

    /// Log sink in the backend's log service
    fn create_logger(&self, group: &str, stream: &str) -> Result<LogSink, BackendError>;

    fn requirements(&self, job: &Job) -> Requirements {
        job.requirements.clone()
    }

    /// Mounts the backend adds to every container
    fn docker_bindings(&self) -> Vec<Mount>;

    /// Scratch directory root
    fn tmp_dir(&self) -> PathBuf;

    fn bucket(&self) -> String;

    async fn shutdown(&self) -> Result<(), BackendError>;
}
