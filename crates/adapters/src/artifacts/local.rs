// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{container_target, ArtifactError, Artifacter};
use async_trait::async_trait;
use jr_core::Mount;
use std::path::PathBuf;

/// Passthrough handle: the storage directory is bind-mounted as is
#[derive(Debug, Clone)]
pub struct LocalArtifact {
    source: PathBuf,
    path: String,
}

impl LocalArtifact {
    pub fn new(source: impl Into<PathBuf>, path: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl Artifacter for LocalArtifact {
    async fn before_run(&self) -> Result<(), ArtifactError> {
        Ok(())
    }

    async fn after_run(&self) -> Result<(), ArtifactError> {
        Ok(())
    }

    fn bindings(&self, container_workdir: &str) -> Result<Vec<Mount>, ArtifactError> {
        let target = container_target(container_workdir, &self.path)?;
        Ok(vec![Mount::bind(self.source.clone(), target)])
    }
}
