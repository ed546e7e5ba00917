// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::container::{ContainerEngine, ContainerError};
use crate::logs::SharedLog;
use crate::repo::{RepoAdapter, RepoError, RepoSource};
use async_trait::async_trait;
use jr_core::{BuildSpec, ContainerSpec};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Wrapper that adds tracing to any ContainerEngine
#[derive(Clone)]
pub struct TracedEngine<E> {
    inner: E,
}

impl<E> TracedEngine<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<E: ContainerEngine> ContainerEngine for TracedEngine<E> {
    fn build_digest(&self, spec: &BuildSpec) -> String {
        let digest = self.inner.build_digest(spec);
        tracing::debug!(digest, base_image = %spec.base_image, "build digest");
        digest
    }

    async fn image_exists(&self, image: &str) -> Result<bool, ContainerError> {
        let result = self.inner.image_exists(image).await;
        tracing::debug!(image, exists = ?result.as_ref().ok(), "checked image");
        result
    }

    async fn build(
        &self,
        spec: &BuildSpec,
        image: &str,
        stop: &CancellationToken,
        logs: SharedLog,
    ) -> Result<(), ContainerError> {
        let span = tracing::info_span!("engine.build", image, base_image = %spec.base_image);
        let _guard = span.enter();

        tracing::info!(commands = spec.commands.len(), "building");

        let start = std::time::Instant::now();
        let result = self.inner.build(spec, image, stop, logs).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(()) => tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "image built"),
            Err(e) => tracing::error!(
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e,
                "build failed"
            ),
        }

        result
    }

    async fn export_image_diff(&self, image: &str, dst: &Path) -> Result<(), ContainerError> {
        let span = tracing::info_span!("engine.export", image, dst = %dst.display());
        let _guard = span.enter();

        let start = std::time::Instant::now();
        let result = self.inner.export_image_diff(image, dst).await;
        match &result {
            Ok(()) => tracing::info!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                "image exported"
            ),
            Err(e) => tracing::error!(error = %e, "export failed"),
        }
        result
    }

    async fn import_image_diff(&self, src: &Path) -> Result<(), ContainerError> {
        let span = tracing::info_span!("engine.import", src = %src.display());
        let _guard = span.enter();

        let start = std::time::Instant::now();
        let result = self.inner.import_image_diff(src).await;
        match &result {
            Ok(()) => tracing::info!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                "image imported"
            ),
            Err(e) => tracing::error!(error = %e, "import failed"),
        }
        result
    }

    async fn run(&self, spec: &ContainerSpec, logs: SharedLog) -> Result<String, ContainerError> {
        let span = tracing::info_span!("engine.run", image = %spec.image);
        let _guard = span.enter();

        tracing::info!(
            mounts = spec.mounts.len(),
            env_count = spec.env.len(),
            ports = spec.binding_ports.len(),
            "starting container"
        );

        let result = self.inner.run(spec, logs).await;
        match &result {
            Ok(id) => tracing::info!(container = %id, "container started"),
            Err(e) => tracing::error!(error = %e, "start failed"),
        }
        result
    }

    async fn wait(&self, id: &str) -> Result<(), ContainerError> {
        let start = std::time::Instant::now();
        let result = self.inner.wait(id).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(()) => tracing::info!(container = id, elapsed_ms, "container exited"),
            Err(e) => tracing::warn!(container = id, elapsed_ms, error = %e, "container failed"),
        }
        result
    }

    async fn stop(&self, id: &str) -> Result<(), ContainerError> {
        let result = self.inner.stop(id).await;
        // Stopping an already exited container is not worth an error
        match &result {
            Ok(()) => tracing::info!(container = id, "container stopped"),
            Err(e) => tracing::warn!(container = id, error = %e, "stop failed (may be expected)"),
        }
        result
    }
}

/// Wrapper that adds tracing to any RepoAdapter
#[derive(Clone)]
pub struct TracedRepoAdapter<R> {
    inner: R,
}

impl<R> TracedRepoAdapter<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<R: RepoAdapter> RepoAdapter for TracedRepoAdapter<R> {
    async fn checkout(&self, source: &RepoSource, dir: &Path) -> Result<(), RepoError> {
        let span = tracing::info_span!(
            "repo.checkout",
            url = %source.url,
            branch = %source.branch,
            hash = %source.hash,
        );
        let _guard = span.enter();

        // Precondition: target directory must exist
        if !dir.is_dir() {
            tracing::error!(dir = %dir.display(), "checkout directory does not exist");
            return Err(RepoError::CommandFailed(format!(
                "checkout directory does not exist: {}",
                dir.display()
            )));
        }

        let start = std::time::Instant::now();
        let result = self.inner.checkout(source, dir).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(()) => tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "checked out"),
            Err(e) => {
                tracing::error!(elapsed_ms = elapsed.as_millis() as u64, error = %e, "failed")
            }
        }

        result
    }

    async fn set_identity(&self, dir: &Path, name: &str, email: &str) -> Result<(), RepoError> {
        let result = self.inner.set_identity(dir, name, email).await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "set identity failed");
        }
        result
    }

    async fn apply_diff(&self, dir: &Path, diff: &str) -> Result<(), RepoError> {
        let span = tracing::info_span!("repo.apply_diff", dir = %dir.display());
        let _guard = span.enter();

        tracing::info!(diff_len = diff.len(), "applying diff");
        let result = self.inner.apply_diff(dir, diff).await;
        match &result {
            Ok(()) => tracing::info!("diff applied"),
            Err(e) => tracing::error!(error = %e, "apply failed"),
        }
        result
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
