// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolution of declared artifacts, caches and dependencies into handles
//!
//! A request the backend cannot serve yields no handle and is skipped.

use jr_adapters::{ArtifactError, ArtifactRequest, ArtifactRole, Artifacter, Backend, BackendError};
use jr_core::{Job, Mount};

type Handle = Box<dyn Artifacter>;

/// Artifact handles owned by the executor for the job's duration
#[derive(Default)]
pub struct ArtifactSet {
    pub inputs: Vec<Handle>,
    pub outputs: Vec<Handle>,
    pub caches: Vec<Handle>,
    /// Outputs synced while the container runs
    pub live: Vec<Handle>,
}

impl ArtifactSet {
    pub fn needs_download(&self) -> bool {
        !self.inputs.is_empty() || !self.caches.is_empty()
    }

    pub fn needs_upload(&self) -> bool {
        !self.outputs.is_empty() || !self.caches.is_empty()
    }

    /// Bind mounts of inputs, outputs and caches, in that order
    pub fn bindings(&self, container_workdir: &str) -> Result<Vec<Mount>, ArtifactError> {
        let mut mounts = Vec::new();
        for handle in self
            .inputs
            .iter()
            .chain(self.outputs.iter())
            .chain(self.caches.iter())
        {
            mounts.extend(handle.bindings(container_workdir)?);
        }
        Ok(mounts)
    }
}

async fn request<B: Backend>(
    backend: &B,
    run_name: &str,
    local_path: &str,
    key: String,
    role: ArtifactRole,
) -> Option<Handle> {
    let request = ArtifactRequest {
        run_name: run_name.to_string(),
        local_path: local_path.to_string(),
        key,
        role,
    };
    let handle = backend.artifact(&request).await;
    if handle.is_none() {
        tracing::warn!(key = %request.key, role = ?role, "no artifact location, skipping");
    }
    handle
}

/// Output handles, plus a live handle for every artifact declared with `mount`
pub async fn outputs<B: Backend>(backend: &B, job: &Job) -> (Vec<Handle>, Vec<Handle>) {
    let mut outputs = Vec::new();
    let mut live = Vec::new();
    for artifact in &job.artifacts {
        let key = job.artifact_key(&artifact.path);
        if let Some(handle) = request(
            backend,
            &job.run_name,
            &artifact.path,
            key.clone(),
            ArtifactRole::Output,
        )
        .await
        {
            outputs.push(handle);
        }
        if artifact.mount {
            if let Some(handle) =
                request(backend, &job.run_name, &artifact.path, key, ArtifactRole::Live).await
            {
                live.push(handle);
            }
        }
    }
    (outputs, live)
}

/// Workflow-scoped cache handles
pub async fn caches<B: Backend>(backend: &B, job: &Job) -> Vec<Handle> {
    let mut handles = Vec::new();
    for cache in &job.cache {
        let key = job.cache_key(&cache.path);
        if let Some(handle) =
            request(backend, &job.run_name, &cache.path, key, ArtifactRole::Cache).await
        {
            handles.push(handle);
        }
    }
    handles
}

/// Input handles for every artifact of every job of each dependency run
pub async fn dependencies<B: Backend>(backend: &B, job: &Job) -> Result<Vec<Handle>, BackendError> {
    let mut handles = Vec::new();
    for dep in &job.deps {
        let keys = backend.list_objects(&dep.jobs_prefix()).await?;
        tracing::debug!(run = %dep.run_name, jobs = keys.len(), "resolving dependency");
        for key in keys {
            let dep_job = backend.job_by_path(&key).await?;
            for artifact in &dep_job.artifacts {
                if let Some(handle) = request(
                    backend,
                    &dep_job.run_name,
                    &artifact.path,
                    dep_job.artifact_key(&artifact.path),
                    ArtifactRole::Input,
                )
                .await
                {
                    handles.push(handle);
                }
            }
        }
    }
    Ok(handles)
}

#[cfg(test)]
#[path = "resolve_tests.rs"]
mod tests;
