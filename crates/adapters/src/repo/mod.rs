// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repository management adapters

mod git;

pub use git::GitAdapter;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeRepoAdapter, RepoCall};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors from repo operations
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("clone of {url} failed: {message}")]
    CloneFailed { url: String, message: String },
    #[error("revision not found: {0}")]
    RevisionNotFound(String),
    #[error("patch does not apply: {0}")]
    PatchFailed(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
}

/// How to authenticate a clone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RepoAuth {
    #[default]
    Anonymous,
    /// OAuth token over HTTPS
    Token(String),
    /// Private key over SSH
    Ssh {
        private_key: String,
        passphrase: Option<String>,
    },
}

/// An exact revision of a remote repository
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoSource {
    pub url: String,
    pub branch: String,
    pub hash: String,
    pub auth: RepoAuth,
}

/// Adapter for repository operations
#[async_trait]
pub trait RepoAdapter: Clone + Send + Sync + 'static {
    /// Clone `source` into `dir` and check out its commit
    async fn checkout(&self, source: &RepoSource, dir: &Path) -> Result<(), RepoError>;

    /// Set the commit identity of the checkout
    async fn set_identity(&self, dir: &Path, name: &str, email: &str) -> Result<(), RepoError>;

    /// Apply a unified diff on top of the checkout
    async fn apply_diff(&self, dir: &Path, diff: &str) -> Result<(), RepoError>;
}
