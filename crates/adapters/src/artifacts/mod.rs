// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifact, cache and dependency handles
//!
//! An [`Artifacter`] moves one declared path in or out of the job's
//! container. The backend picks the variant when it resolves the handle;
//! the executor only ever sees the trait.

mod local;
#[cfg(any(test, feature = "test-support"))]
mod sync;

pub use local::LocalArtifact;
#[cfg(any(test, feature = "test-support"))]
pub use sync::{DirStore, Direction, ObjectStore, SyncArtifact};

use async_trait::async_trait;
use jr_core::Mount;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("invalid artifact path: {0}")]
    InvalidPath(String),
    #[error("transfer of {key} failed: {source}")]
    Transfer {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait Artifacter: Send + Sync {
    /// Materialize the contents before the container starts
    async fn before_run(&self) -> Result<(), ArtifactError>;

    /// Persist the contents after the container exits
    async fn after_run(&self) -> Result<(), ArtifactError>;

    /// Bind mounts exposing the contents under `container_workdir`
    fn bindings(&self, container_workdir: &str) -> Result<Vec<Mount>, ArtifactError>;
}

/// Where a job-relative path lands inside the container
pub fn container_target(container_workdir: &str, path: &str) -> Result<String, ArtifactError> {
    if path.is_empty() || path.split('/').any(|part| part == "..") {
        return Err(ArtifactError::InvalidPath(path.to_string()));
    }
    if path.starts_with('/') {
        return Ok(path.to_string());
    }
    Ok(format!(
        "{}/{}",
        container_workdir.trim_end_matches('/'),
        path.trim_start_matches("./")
    ))
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
