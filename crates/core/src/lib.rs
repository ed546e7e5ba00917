// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! jr-core: domain model for the job runner
//!
//! This crate provides:
//! - The job record as exchanged with the control plane
//! - The job status state machine and build policy
//! - Immutable container/build descriptors and the build identity digest
//! - Environment merging, secret interpolation and app port resolution
//! - The runner configuration file

pub mod config;
pub mod environment;
pub mod interpolate;
pub mod job;
pub mod ports;
pub mod spec;
pub mod status;

pub use config::{ConfigError, RunnerConfig, Timing};
pub use environment::Environment;
pub use interpolate::{InterpolateError, VariablesInterpolator};
pub use job::{
    AppSpec, ArtifactSpec, BuildPolicy, CacheSpec, DepSpec, ErrorCode, GitCredentials,
    GitProtocol, GpuRequirements, Job, RegistryAuth, RepoType, Requirements,
};
pub use ports::{PortBinding, PortError};
pub use spec::{shell_commands, unique_mounts, BuildSpec, ContainerSpec, Mount, WORKFLOW_DIR};
pub use status::JobStatus;
