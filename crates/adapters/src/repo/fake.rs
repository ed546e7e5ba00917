// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake repository adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{RepoAdapter, RepoError, RepoSource};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Recorded repo call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoCall {
    Checkout { source: RepoSource, dir: PathBuf },
    SetIdentity { dir: PathBuf, name: String, email: String },
    ApplyDiff { dir: PathBuf, diff: String },
}

/// Fake repository adapter: "clones" by writing the configured files
#[derive(Clone, Default)]
pub struct FakeRepoAdapter {
    files: Arc<Mutex<HashMap<String, String>>>,
    calls: Arc<Mutex<Vec<RepoCall>>>,
    fail_checkout: Arc<Mutex<bool>>,
}

impl FakeRepoAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// File written into every checkout
    pub fn with_file(self, name: &str, content: &str) -> Self {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), content.to_string());
        self
    }

    pub fn fail_checkout(&self) {
        *self.fail_checkout.lock().unwrap_or_else(|e| e.into_inner()) = true;
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<RepoCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, call: RepoCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

#[async_trait]
impl RepoAdapter for FakeRepoAdapter {
    async fn checkout(&self, source: &RepoSource, dir: &Path) -> Result<(), RepoError> {
        self.record(RepoCall::Checkout {
            source: source.clone(),
            dir: dir.to_path_buf(),
        });
        if *self.fail_checkout.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(RepoError::CloneFailed {
                url: source.url.clone(),
                message: "repository not found".to_string(),
            });
        }
        let files = self
            .files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for (name, content) in files {
            std::fs::write(dir.join(name), content)
                .map_err(|e| RepoError::CommandFailed(e.to_string()))?;
        }
        Ok(())
    }

    async fn set_identity(&self, dir: &Path, name: &str, email: &str) -> Result<(), RepoError> {
        self.record(RepoCall::SetIdentity {
            dir: dir.to_path_buf(),
            name: name.to_string(),
            email: email.to_string(),
        });
        Ok(())
    }

    async fn apply_diff(&self, dir: &Path, diff: &str) -> Result<(), RepoError> {
        self.record(RepoCall::ApplyDiff {
            dir: dir.to_path_buf(),
            diff: diff.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
