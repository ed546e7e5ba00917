// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Directory-backed backend for the local compute target
//!
//! Layout under the storage root:
//!
//! ```text
//! jobs/<repo_id>/<run_name>,<job_id>.json   job records
//! stops/<job_id>                            stop requests
//! secrets/<repo_id>.json                    name -> value
//! credentials/<repo_id>.json                git credentials
//! repos/<repo_id>/<file>                    uncommitted diffs
//! archives/<file>                           source tarballs
//! builds/<repo_id>/<digest>.tar             build diffs
//! artifacts/, cache/                        bind-mounted in place
//! logs/                                     JSON-lines logs
//! tmp/                                      scratch
//! ```

use super::{ArtifactRequest, Backend, BackendError};
use crate::artifacts::{Artifacter, LocalArtifact};
use crate::logs::{JsonLineLog, LogSink};
use async_trait::async_trait;
use jr_core::{GitCredentials, Job, Mount};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, key: &str) -> PathBuf {
        self.root.join(key.trim_start_matches('/'))
    }

    fn stop_path(&self, job_id: &str) -> PathBuf {
        self.root.join("stops").join(job_id)
    }

    /// Ask the runner of `job_id` to stop
    pub fn request_stop(&self, job_id: &str) -> Result<(), BackendError> {
        let path = self.stop_path(job_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, b"")?;
        Ok(())
    }

    fn find_job(&self, job_id: &str) -> Result<Option<PathBuf>, BackendError> {
        let jobs = self.root.join("jobs");
        if !jobs.exists() {
            return Ok(None);
        }
        let suffix = format!(",{job_id}.json");
        for entry in WalkDir::new(&jobs).min_depth(2).max_depth(2) {
            let entry = entry.map_err(std::io::Error::other)?;
            if entry.file_name().to_string_lossy().ends_with(&suffix) {
                return Ok(Some(entry.into_path()));
            }
        }
        Ok(None)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, BackendError> {
    let content = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => BackendError::NotFound(path.display().to_string()),
        _ => BackendError::Io(e),
    })?;
    serde_json::from_slice(&content).map_err(|source| BackendError::Malformed {
        path: path.display().to_string(),
        source,
    })
}

fn read_optional_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, BackendError> {
    match read_json(path) {
        Ok(value) => Ok(Some(value)),
        Err(BackendError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Write via a sibling temp file so readers never see a partial record
fn write_atomic(path: &Path, content: &[u8]) -> Result<(), BackendError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Run filesystem work on the blocking pool
async fn blocking<T, F>(f: F) -> Result<T, BackendError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, BackendError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BackendError::Io(std::io::Error::other(e)))?
}

fn list_dir(path: &Path, dir: &str, name_prefix: &str) -> Result<Vec<String>, BackendError> {
    if !path.is_dir() {
        return Ok(Vec::new());
    }
    let mut keys = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let name = entry?.file_name().to_string_lossy().to_string();
        if name.starts_with(name_prefix) && !name.ends_with(".tmp") {
            keys.push(if dir.is_empty() {
                name
            } else {
                format!("{dir}/{name}")
            });
        }
    }
    keys.sort();
    Ok(keys)
}

#[async_trait]
impl Backend for LocalBackend {
    async fn init(&self, job_id: &str) -> Result<Job, BackendError> {
        std::fs::create_dir_all(self.tmp_dir())?;
        let path = self
            .find_job(job_id)?
            .ok_or_else(|| BackendError::JobNotAssigned(job_id.to_string()))?;
        read_json(&path)
    }

    async fn refetch_job(&self, job: &Job) -> Result<Job, BackendError> {
        read_json(&self.path_of(&job.record_key()))
    }

    async fn update_state(&self, job: &Job) -> Result<(), BackendError> {
        let content = serde_json::to_vec_pretty(job).map_err(|source| BackendError::Malformed {
            path: job.record_key(),
            source,
        })?;
        let path = self.path_of(&job.record_key());
        blocking(move || write_atomic(&path, &content)).await
    }

    async fn check_stop(&self, job: &Job) -> Result<bool, BackendError> {
        Ok(self.stop_path(&job.job_id).exists())
    }

    async fn is_interrupted(&self) -> Result<bool, BackendError> {
        Ok(false)
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn artifact(&self, request: &ArtifactRequest) -> Option<Box<dyn Artifacter>> {
        let source = self.path_of(&request.key);
        let dir = source.clone();
        let created = blocking(move || std::fs::create_dir_all(&dir).map_err(BackendError::from));
        if let Err(e) = created.await {
            tracing::warn!(key = %request.key, error = %e, "artifact directory unavailable");
            return None;
        }
        Some(Box::new(LocalArtifact::new(
            source,
            request.local_path.clone(),
        )))
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, BackendError> {
        let (dir, name_prefix) = match prefix.rsplit_once('/') {
            Some((dir, rest)) => (dir, rest),
            None => ("", prefix),
        };
        let path = self.path_of(dir);
        let dir = dir.to_string();
        let name_prefix = name_prefix.to_string();
        blocking(move || list_dir(&path, &dir, &name_prefix)).await
    }

    async fn job_by_path(&self, key: &str) -> Result<Job, BackendError> {
        read_json(&self.path_of(key))
    }

    async fn master_job(&self, job: &Job) -> Result<Option<Job>, BackendError> {
        let Some(master_id) = &job.master_job_id else {
            return Ok(None);
        };
        let path = self
            .find_job(master_id)?
            .ok_or_else(|| BackendError::NotFound(format!("master job {master_id}")))?;
        read_json(&path).map(Some)
    }

    async fn secrets(&self, job: &Job) -> Result<HashMap<String, String>, BackendError> {
        let path = self.root.join("secrets").join(format!("{}.json", job.repo_id));
        Ok(read_optional_json(&path)?.unwrap_or_default())
    }

    async fn git_credentials(&self, job: &Job) -> Result<Option<GitCredentials>, BackendError> {
        let path = self
            .root
            .join("credentials")
            .join(format!("{}.json", job.repo_id));
        read_optional_json(&path)
    }

    async fn repo_diff(&self, job: &Job, filename: &str) -> Result<String, BackendError> {
        let path = self.root.join("repos").join(&job.repo_id).join(filename);
        std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BackendError::NotFound(path.display().to_string()),
            _ => BackendError::Io(e),
        })
    }

    async fn repo_archive(
        &self,
        _job: &Job,
        filename: &str,
        dst: &Path,
    ) -> Result<(), BackendError> {
        let path = self.root.join("archives").join(filename);
        let file = std::fs::File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BackendError::NotFound(path.display().to_string()),
            _ => BackendError::Io(e),
        })?;
        let dst = dst.to_path_buf();
        let name = filename.to_string();
        tokio::task::spawn_blocking(move || tar::Archive::new(file).unpack(&dst))
            .await
            .map_err(|e| BackendError::Archive {
                name: name.clone(),
                message: e.to_string(),
            })?
            .map_err(|e| BackendError::Archive {
                name,
                message: e.to_string(),
            })
    }

    async fn build_diff(&self, key: &str, dst: &Path) -> Result<bool, BackendError> {
        let src = self.path_of(key);
        let dst = dst.to_path_buf();
        blocking(move || {
            if !src.is_file() {
                return Ok(false);
            }
            std::fs::copy(&src, &dst)?;
            Ok(true)
        })
        .await
    }

    async fn put_build_diff(&self, src: &Path, key: &str) -> Result<(), BackendError> {
        let src = src.to_path_buf();
        let dst = self.path_of(key);
        blocking(move || {
            if let Some(parent) = dst.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&src, &dst)?;
            Ok(())
        })
        .await
    }

    fn create_logger(&self, group: &str, stream: &str) -> Result<LogSink, BackendError> {
        let path = self
            .root
            .join("logs")
            .join(group.trim_start_matches('/'))
            .join(format!("{stream}.jsonl"));
        Ok(Box::new(JsonLineLog::open(&path)?))
    }

    fn docker_bindings(&self) -> Vec<Mount> {
        Vec::new()
    }

    fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    fn bucket(&self) -> String {
        "local".to_string()
    }

    async fn shutdown(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
