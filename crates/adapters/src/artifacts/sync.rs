// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handles that copy between a local directory and durable storage
//!
//! Models the copy-in/copy-out artifacts of cloud compute targets; `DirStore`
//! stands in for the object store. Built for the fake backend only.

use super::{container_target, ArtifactError, Artifacter};
use async_trait::async_trait;
use jr_core::Mount;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Durable storage addressed by key prefix
#[async_trait]
pub trait ObjectStore: Clone + Send + Sync + 'static {
    /// Copy every object under `prefix` into `dst`; returns the file count.
    /// An empty prefix copies nothing and is not an error.
    async fn download(&self, prefix: &str, dst: &Path) -> Result<usize, ArtifactError>;

    /// Copy every file under `src` to objects under `prefix`
    async fn upload(&self, src: &Path, prefix: &str) -> Result<usize, ArtifactError>;
}

/// Object store backed by a directory tree
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_of(&self, key: &str) -> PathBuf {
        self.root.join(key.trim_start_matches('/'))
    }
}

#[async_trait]
impl ObjectStore for DirStore {
    async fn download(&self, prefix: &str, dst: &Path) -> Result<usize, ArtifactError> {
        let src = self.path_of(prefix);
        let dst = dst.to_path_buf();
        copy_blocking(prefix, src, dst).await
    }

    async fn upload(&self, src: &Path, prefix: &str) -> Result<usize, ArtifactError> {
        let dst = self.path_of(prefix);
        copy_blocking(prefix, src.to_path_buf(), dst).await
    }
}

async fn copy_blocking(key: &str, src: PathBuf, dst: PathBuf) -> Result<usize, ArtifactError> {
    let result = tokio::task::spawn_blocking(move || copy_tree(&src, &dst))
        .await
        .unwrap_or_else(|e| Err(io::Error::other(e)));
    result.map_err(|source| ArtifactError::Transfer {
        key: key.to_string(),
        source,
    })
}

fn copy_tree(src: &Path, dst: &Path) -> io::Result<usize> {
    std::fs::create_dir_all(dst)?;
    if !src.exists() {
        return Ok(0);
    }
    let mut copied = 0;
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Which transfers a [`SyncArtifact`] performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Pull before run (dependency inputs)
    Input,
    /// Push after run (outputs)
    Output,
    /// Pull before and push after (caches, live outputs)
    Both,
}

impl Direction {
    pub fn pulls(&self) -> bool {
        matches!(self, Direction::Input | Direction::Both)
    }

    pub fn pushes(&self) -> bool {
        matches!(self, Direction::Output | Direction::Both)
    }
}

/// Copies one declared path between `local` and `key` in the store
#[derive(Debug, Clone)]
pub struct SyncArtifact<S> {
    store: S,
    key: String,
    local: PathBuf,
    path: String,
    direction: Direction,
}

impl<S: ObjectStore> SyncArtifact<S> {
    pub fn new(
        store: S,
        key: impl Into<String>,
        local: impl Into<PathBuf>,
        path: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            local: local.into(),
            path: path.into(),
            direction,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

#[async_trait]
impl<S: ObjectStore> Artifacter for SyncArtifact<S> {
    async fn before_run(&self) -> Result<(), ArtifactError> {
        if !self.direction.pulls() {
            return Ok(());
        }
        let files = self.store.download(&self.key, &self.local).await?;
        tracing::debug!(key = %self.key, files, "artifact downloaded");
        Ok(())
    }

    async fn after_run(&self) -> Result<(), ArtifactError> {
        if !self.direction.pushes() {
            return Ok(());
        }
        let files = self.store.upload(&self.local, &self.key).await?;
        tracing::debug!(key = %self.key, files, "artifact uploaded");
        Ok(())
    }

    fn bindings(&self, container_workdir: &str) -> Result<Vec<Mount>, ArtifactError> {
        let target = container_target(container_workdir, &self.path)?;
        std::fs::create_dir_all(&self.local).map_err(|source| ArtifactError::Transfer {
            key: self.key.clone(),
            source,
        })?;
        Ok(vec![Mount::bind(self.local.clone(), target)])
    }
}
