// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the job executor

use jr_adapters::{ArtifactError, BackendError, ContainerError, RepoError};
use jr_core::PortError;
use std::fmt;
use thiserror::Error;

/// Pipeline phase a failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Stage,
    Resolve,
    Mount,
    Download,
    Spec,
    Logs,
    Build,
    Run,
    Upload,
    Unmount,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Stage => "stage repository",
            Phase::Resolve => "resolve dependencies",
            Phase::Mount => "mount live artifacts",
            Phase::Download => "download inputs",
            Phase::Spec => "assemble run spec",
            Phase::Logs => "open log sinks",
            Phase::Build => "build image",
            Phase::Run => "run container",
            Phase::Upload => "upload outputs",
            Phase::Unmount => "unmount live artifacts",
        };
        f.write_str(s)
    }
}

/// Underlying cause of a phase failure
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Ports(#[from] PortError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no cached build {digest} and the policy forbids building")]
    BuildNotFound { digest: String },
}

/// Errors surfaced by the executor
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("init failed after {attempts} attempt(s): {source}")]
    Init {
        attempts: u32,
        #[source]
        source: BackendError,
    },
    #[error("{phase}: {source}")]
    Phase {
        phase: Phase,
        #[source]
        source: StepError,
    },
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    /// A stop was observed at a checkpoint
    #[error("job stopped")]
    Stopped,
    #[error("executor fault: {0}")]
    Fault(String),
}

impl ExecutorError {
    /// Exit code when the job's container process failed
    pub fn container_exit_code(&self) -> Option<i64> {
        match self {
            ExecutorError::Phase {
                source: StepError::Container(e),
                ..
            } => e.exit_code(),
            _ => None,
        }
    }

    pub fn is_build_not_found(&self) -> bool {
        matches!(
            self,
            ExecutorError::Phase {
                source: StepError::BuildNotFound { .. },
                ..
            }
        )
    }
}

/// Attach the failing phase to a step result
pub(crate) trait PhaseExt<T> {
    fn phase(self, phase: Phase) -> Result<T, ExecutorError>;
}

impl<T, E: Into<StepError>> PhaseExt<T> for Result<T, E> {
    fn phase(self, phase: Phase) -> Result<T, ExecutorError> {
        self.map_err(|e| ExecutorError::Phase {
            phase,
            source: e.into(),
        })
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
