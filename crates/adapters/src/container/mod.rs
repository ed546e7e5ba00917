// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container engine adapters

mod docker;

pub use docker::{build_args, commit_args, DockerEngine, ImageConfig};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{EngineCall, FakeEngine};

use crate::logs::SharedLog;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use jr_core::{BuildSpec, ContainerSpec};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors from container operations
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The job's container process exited non-zero
    #[error("container exited with code {exit_code}")]
    Exited { exit_code: i64 },
    #[error("build commands exited with code {exit_code}")]
    BuildFailed { exit_code: i64 },
    #[error("build stopped before it started")]
    BuildStopped,
    #[error("no such container: {0}")]
    NoSuchContainer(String),
    #[error("invalid registry auth: {0}")]
    InvalidAuth(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
}

impl ContainerError {
    /// Exit code when the job's own process failed
    pub fn exit_code(&self) -> Option<i64> {
        match self {
            ContainerError::Exited { exit_code } => Some(*exit_code),
            _ => None,
        }
    }
}

/// Adapter for building and running the job's container
#[async_trait]
pub trait ContainerEngine: Clone + Send + Sync + 'static {
    /// Build identity of `spec`
    fn build_digest(&self, spec: &BuildSpec) -> String {
        spec.digest()
    }

    /// Whether `image` is present in the local image store
    async fn image_exists(&self, image: &str) -> Result<bool, ContainerError>;

    /// Run the build commands on the base image and tag the result `image`.
    ///
    /// `stop` is only consulted before the build starts; a started build
    /// runs to completion.
    async fn build(
        &self,
        spec: &BuildSpec,
        image: &str,
        stop: &CancellationToken,
        logs: SharedLog,
    ) -> Result<(), ContainerError>;

    /// Write `image` as a portable diff file
    async fn export_image_diff(&self, image: &str, dst: &Path) -> Result<(), ContainerError>;

    /// Load a diff file written by [`ContainerEngine::export_image_diff`]
    async fn import_image_diff(&self, src: &Path) -> Result<(), ContainerError>;

    /// Start the container, draining its output into `logs`; returns its id
    async fn run(&self, spec: &ContainerSpec, logs: SharedLog) -> Result<String, ContainerError>;

    /// Block until the container exits; non-zero is [`ContainerError::Exited`]
    async fn wait(&self, id: &str) -> Result<(), ContainerError>;

    async fn stop(&self, id: &str) -> Result<(), ContainerError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
}

/// Base64 auth blob for a registry login, or `None` when both fields are empty
pub fn encode_registry_auth(username: &str, password: &str) -> Option<String> {
    if username.is_empty() && password.is_empty() {
        return None;
    }
    let creds = RegistryCredentials {
        username: username.to_string(),
        password: password.to_string(),
    };
    let json = serde_json::to_vec(&creds).ok()?;
    Some(STANDARD.encode(json))
}

pub fn decode_registry_auth(blob: &str) -> Result<RegistryCredentials, ContainerError> {
    let bytes = STANDARD
        .decode(blob)
        .map_err(|e| ContainerError::InvalidAuth(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| ContainerError::InvalidAuth(e.to_string()))
}

/// Registry host of an image reference, `None` for Docker Hub images
pub fn registry_host(image: &str) -> Option<&str> {
    let (first, _) = image.split_once('/')?;
    if first.contains('.') || first.contains(':') || first == "localhost" {
        Some(first)
    } else {
        None
    }
}

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;
