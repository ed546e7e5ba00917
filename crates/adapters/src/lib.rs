// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for external I/O

pub mod artifacts;
pub mod backend;
pub mod container;
pub mod logs;
pub mod repo;
pub mod traced;

pub use artifacts::{ArtifactError, Artifacter, LocalArtifact};
pub use backend::{ArtifactRequest, ArtifactRole, Backend, BackendError, LocalBackend};
pub use container::{ContainerEngine, ContainerError, DockerEngine};
pub use logs::{FanOut, LogSink, SharedLog, StreamServer};
pub use repo::{GitAdapter, RepoAdapter, RepoAuth, RepoError, RepoSource};
pub use traced::{TracedEngine, TracedRepoAdapter};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use artifacts::{DirStore, Direction, ObjectStore, SyncArtifact};
#[cfg(any(test, feature = "test-support"))]
pub use backend::{ArtifactCall, ArtifactEvent, FakeBackend};
#[cfg(any(test, feature = "test-support"))]
pub use container::{EngineCall, FakeEngine};
#[cfg(any(test, feature = "test-support"))]
pub use repo::{FakeRepoAdapter, RepoCall};
