// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake backend for testing
//!
//! Behaves like a cloud backend by default: artifacts and caches are
//! synchronized with a directory store rather than bind-mounted in place.
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{ArtifactRequest, ArtifactRole, Backend, BackendError};
use crate::artifacts::{ArtifactError, Artifacter, DirStore, Direction, SyncArtifact};
use crate::logs::LogSink;
use async_trait::async_trait;
use jr_core::{GitCredentials, Job, JobStatus, Mount};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Artifact lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactEvent {
    BeforeRun,
    AfterRun,
}

/// Recorded artifact call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCall {
    pub key: String,
    pub role: ArtifactRole,
    pub event: ArtifactEvent,
}

#[derive(Default)]
struct FakeBackendState {
    jobs: HashMap<String, Job>,
    updates: Vec<Job>,
    pending_inits: u32,
    init_error: Option<String>,
    stop_requested: bool,
    stop_error: bool,
    failing_status: Option<JobStatus>,
    interrupted: bool,
    is_local: bool,
    secrets: HashMap<String, String>,
    git_credentials: Option<GitCredentials>,
    repo_diffs: HashMap<String, String>,
    archives: HashMap<String, Vec<(String, String)>>,
    build_diffs: HashMap<String, Vec<u8>>,
    bindings: Vec<Mount>,
    logs: HashMap<String, Vec<u8>>,
    artifact_calls: Vec<ArtifactCall>,
    requests: Vec<ArtifactRequest>,
    shutdowns: usize,
}

#[derive(Clone)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeBackendState>>,
    root: PathBuf,
}

impl FakeBackend {
    /// A backend keeping storage and scratch files under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeBackendState::default())),
            root: root.into(),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeBackendState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn store(&self) -> DirStore {
        DirStore::new(self.root.join("store"))
    }

    /// Register a job record, also reachable by its record key
    pub fn add_job(&self, job: Job) {
        self.state().jobs.insert(job.job_id.clone(), job);
    }

    /// Fail the next `count` inits with "not assigned"
    pub fn set_pending_inits(&self, count: u32) {
        self.state().pending_inits = count;
    }

    /// Fail every init with a non-retryable error
    pub fn set_init_error(&self, message: &str) {
        self.state().init_error = Some(message.to_string());
    }

    pub fn request_stop(&self) {
        self.state().stop_requested = true;
    }

    /// Make `check_stop` fail
    pub fn set_stop_error(&self) {
        self.state().stop_error = true;
    }

    /// Make `update_state` fail for records carrying `status`
    pub fn fail_updates_with(&self, status: JobStatus) {
        self.state().failing_status = Some(status);
    }

    pub fn set_interrupted(&self, interrupted: bool) {
        self.state().interrupted = interrupted;
    }

    pub fn set_local(&self, is_local: bool) {
        self.state().is_local = is_local;
    }

    pub fn set_secrets(&self, secrets: &[(&str, &str)]) {
        self.state().secrets = secrets
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
    }

    pub fn set_git_credentials(&self, creds: GitCredentials) {
        self.state().git_credentials = Some(creds);
    }

    pub fn add_repo_diff(&self, filename: &str, diff: &str) {
        self.state()
            .repo_diffs
            .insert(filename.to_string(), diff.to_string());
    }

    /// Archive holding `(path, content)` files
    pub fn add_archive(&self, filename: &str, files: &[(&str, &str)]) {
        self.state().archives.insert(
            filename.to_string(),
            files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
        );
    }

    pub fn add_docker_binding(&self, mount: Mount) {
        self.state().bindings.push(mount);
    }

    /// Every pushed job record, in order
    pub fn updates(&self) -> Vec<Job> {
        self.state().updates.clone()
    }

    /// Status of every pushed record, consecutive duplicates collapsed
    pub fn statuses(&self) -> Vec<JobStatus> {
        let mut statuses: Vec<JobStatus> = Vec::new();
        for job in self.state().updates.iter() {
            if statuses.last() != Some(&job.status) {
                statuses.push(job.status);
            }
        }
        statuses
    }

    /// Latest pushed record
    pub fn last_update(&self) -> Option<Job> {
        self.state().updates.last().cloned()
    }

    pub fn has_build_diff(&self, key: &str) -> bool {
        self.state().build_diffs.contains_key(key)
    }

    pub fn build_diff_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state().build_diffs.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Everything written to a log stream
    pub fn log_contents(&self, group: &str, stream: &str) -> String {
        let key = format!("{group}/{stream}");
        self.state()
            .logs
            .get(&key)
            .map(|b| String::from_utf8_lossy(b).to_string())
            .unwrap_or_default()
    }

    pub fn artifact_calls(&self) -> Vec<ArtifactCall> {
        self.state().artifact_calls.clone()
    }

    pub fn artifact_requests(&self) -> Vec<ArtifactRequest> {
        self.state().requests.clone()
    }

    pub fn shutdown_count(&self) -> usize {
        self.state().shutdowns
    }
}

/// Delegates to a sync handle and records each lifecycle call
struct RecordingArtifact {
    inner: SyncArtifact<DirStore>,
    role: ArtifactRole,
    state: Arc<Mutex<FakeBackendState>>,
}

impl RecordingArtifact {
    fn record(&self, event: ArtifactEvent) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .artifact_calls
            .push(ArtifactCall {
                key: self.inner.key().to_string(),
                role: self.role,
                event,
            });
    }
}

#[async_trait]
impl Artifacter for RecordingArtifact {
    async fn before_run(&self) -> Result<(), ArtifactError> {
        self.record(ArtifactEvent::BeforeRun);
        self.inner.before_run().await
    }

    async fn after_run(&self) -> Result<(), ArtifactError> {
        self.record(ArtifactEvent::AfterRun);
        self.inner.after_run().await
    }

    fn bindings(&self, container_workdir: &str) -> Result<Vec<Mount>, ArtifactError> {
        self.inner.bindings(container_workdir)
    }
}

struct FakeLog {
    key: String,
    state: Arc<Mutex<FakeBackendState>>,
}

impl Write for FakeLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .logs
            .entry(self.key.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn not_found(what: &str) -> BackendError {
    BackendError::NotFound(what.to_string())
}

#[async_trait]
impl Backend for FakeBackend {
    async fn init(&self, job_id: &str) -> Result<Job, BackendError> {
        let mut state = self.state();
        if let Some(message) = &state.init_error {
            return Err(BackendError::Io(io::Error::other(message.clone())));
        }
        if state.pending_inits > 0 {
            state.pending_inits -= 1;
            return Err(BackendError::JobNotAssigned(job_id.to_string()));
        }
        state
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| BackendError::JobNotAssigned(job_id.to_string()))
    }

    async fn refetch_job(&self, job: &Job) -> Result<Job, BackendError> {
        self.state()
            .jobs
            .get(&job.job_id)
            .cloned()
            .ok_or_else(|| not_found(&job.job_id))
    }

    async fn update_state(&self, job: &Job) -> Result<(), BackendError> {
        let mut state = self.state();
        if state.failing_status == Some(job.status) {
            return Err(BackendError::Io(io::Error::other("state store unavailable")));
        }
        state.updates.push(job.clone());
        state.jobs.insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn check_stop(&self, _job: &Job) -> Result<bool, BackendError> {
        let state = self.state();
        if state.stop_error {
            return Err(BackendError::Io(io::Error::other("stop flag unavailable")));
        }
        Ok(state.stop_requested)
    }

    async fn is_interrupted(&self) -> Result<bool, BackendError> {
        Ok(self.state().interrupted)
    }

    fn is_local(&self) -> bool {
        self.state().is_local
    }

    async fn artifact(&self, request: &ArtifactRequest) -> Option<Box<dyn Artifacter>> {
        self.state().requests.push(request.clone());
        let direction = match request.role {
            ArtifactRole::Input => Direction::Input,
            ArtifactRole::Output => Direction::Output,
            ArtifactRole::Live | ArtifactRole::Cache => Direction::Both,
        };
        let local = self
            .tmp_dir()
            .join("artifacts")
            .join(&request.run_name)
            .join(request.local_path.trim_start_matches('/'));
        Some(Box::new(RecordingArtifact {
            inner: SyncArtifact::new(
                self.store(),
                request.key.clone(),
                local,
                request.local_path.clone(),
                direction,
            ),
            role: request.role,
            state: self.state.clone(),
        }))
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, BackendError> {
        let mut keys: Vec<String> = self
            .state()
            .jobs
            .values()
            .map(Job::record_key)
            .filter(|key| key.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn job_by_path(&self, key: &str) -> Result<Job, BackendError> {
        self.state()
            .jobs
            .values()
            .find(|job| job.record_key() == key)
            .cloned()
            .ok_or_else(|| not_found(key))
    }

    async fn master_job(&self, job: &Job) -> Result<Option<Job>, BackendError> {
        let Some(master_id) = &job.master_job_id else {
            return Ok(None);
        };
        self.state()
            .jobs
            .get(master_id)
            .cloned()
            .map(Some)
            .ok_or_else(|| not_found(master_id))
    }

    async fn secrets(&self, _job: &Job) -> Result<HashMap<String, String>, BackendError> {
        Ok(self.state().secrets.clone())
    }

    async fn git_credentials(&self, _job: &Job) -> Result<Option<GitCredentials>, BackendError> {
        Ok(self.state().git_credentials.clone())
    }

    async fn repo_diff(&self, _job: &Job, filename: &str) -> Result<String, BackendError> {
        self.state()
            .repo_diffs
            .get(filename)
            .cloned()
            .ok_or_else(|| not_found(filename))
    }

    async fn repo_archive(
        &self,
        _job: &Job,
        filename: &str,
        dst: &Path,
    ) -> Result<(), BackendError> {
        let files = self
            .state()
            .archives
            .get(filename)
            .cloned()
            .ok_or_else(|| not_found(filename))?;
        for (path, content) in files {
            let target = dst.join(path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(target, content)?;
        }
        Ok(())
    }

    async fn build_diff(&self, key: &str, dst: &Path) -> Result<bool, BackendError> {
        let diff = self.state().build_diffs.get(key).cloned();
        match diff {
            Some(bytes) => {
                std::fs::write(dst, bytes)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn put_build_diff(&self, src: &Path, key: &str) -> Result<(), BackendError> {
        let bytes = std::fs::read(src)?;
        self.state().build_diffs.insert(key.to_string(), bytes);
        Ok(())
    }

    fn create_logger(&self, group: &str, stream: &str) -> Result<LogSink, BackendError> {
        Ok(Box::new(FakeLog {
            key: format!("{group}/{stream}"),
            state: self.state.clone(),
        }))
    }

    fn docker_bindings(&self) -> Vec<Mount> {
        self.state().bindings.clone()
    }

    fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    fn bucket(&self) -> String {
        "fake-bucket".to_string()
    }

    async fn shutdown(&self) -> Result<(), BackendError> {
        self.state().shutdowns += 1;
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
