// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake container engine for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{ContainerEngine, ContainerError};
use crate::logs::SharedLog;
use async_trait::async_trait;
use jr_core::{BuildSpec, ContainerSpec};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Recorded engine call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    ImageExists { image: String },
    Build { image: String, commands: Vec<String> },
    ExportDiff { image: String, dst: PathBuf },
    ImportDiff { src: PathBuf },
    Run { image: String },
    Wait { id: String },
    Stop { id: String },
}

#[derive(Default)]
struct FakeEngineState {
    images: HashSet<String>,
    calls: Vec<EngineCall>,
    runs: Vec<ContainerSpec>,
    exit_code: i64,
    build_failure: Option<i64>,
    output: String,
    block_until_stopped: bool,
}

/// In-memory engine.
///
/// Exported diffs are files holding the image name, so an engine importing
/// a diff written by another engine ends up with the same image.
#[derive(Clone, Default)]
pub struct FakeEngine {
    state: Arc<Mutex<FakeEngineState>>,
    stopped: CancellationToken,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeEngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: EngineCall) {
        self.state().calls.push(call);
    }

    /// Exit code returned by `wait`
    pub fn set_exit_code(&self, code: i64) {
        self.state().exit_code = code;
    }

    pub fn set_build_failure(&self, exit_code: i64) {
        self.state().build_failure = Some(exit_code);
    }

    /// Output written to the log sink when a container starts
    pub fn set_output(&self, output: &str) {
        self.state().output = output.to_string();
    }

    /// Make `wait` block until `stop` is called
    pub fn block_until_stopped(&self) {
        self.state().block_until_stopped = true;
    }

    pub fn add_image(&self, image: &str) {
        self.state().images.insert(image.to_string());
    }

    pub fn has_image(&self, image: &str) -> bool {
        self.state().images.contains(image)
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state().calls.clone()
    }

    /// Number of times build commands were executed
    pub fn build_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c, EngineCall::Build { .. }))
            .count()
    }

    pub fn stop_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c, EngineCall::Stop { .. }))
            .count()
    }

    /// Specs of every started container
    pub fn runs(&self) -> Vec<ContainerSpec> {
        self.state().runs.clone()
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn image_exists(&self, image: &str) -> Result<bool, ContainerError> {
        self.record(EngineCall::ImageExists {
            image: image.to_string(),
        });
        Ok(self.has_image(image))
    }

    async fn build(
        &self,
        spec: &BuildSpec,
        image: &str,
        stop: &CancellationToken,
        mut logs: SharedLog,
    ) -> Result<(), ContainerError> {
        if stop.is_cancelled() {
            return Err(ContainerError::BuildStopped);
        }
        self.record(EngineCall::Build {
            image: image.to_string(),
            commands: spec.commands.clone(),
        });
        for command in &spec.commands {
            let _ = writeln!(logs, "+ {command}");
        }
        let mut state = self.state();
        if let Some(exit_code) = state.build_failure {
            return Err(ContainerError::BuildFailed { exit_code });
        }
        state.images.insert(image.to_string());
        Ok(())
    }

    async fn export_image_diff(&self, image: &str, dst: &Path) -> Result<(), ContainerError> {
        self.record(EngineCall::ExportDiff {
            image: image.to_string(),
            dst: dst.to_path_buf(),
        });
        if !self.has_image(image) {
            return Err(ContainerError::CommandFailed(format!("no such image: {image}")));
        }
        std::fs::write(dst, image).map_err(|e| ContainerError::CommandFailed(e.to_string()))
    }

    async fn import_image_diff(&self, src: &Path) -> Result<(), ContainerError> {
        self.record(EngineCall::ImportDiff {
            src: src.to_path_buf(),
        });
        let image = std::fs::read_to_string(src)
            .map_err(|e| ContainerError::CommandFailed(e.to_string()))?;
        self.add_image(image.trim());
        Ok(())
    }

    async fn run(
        &self,
        spec: &ContainerSpec,
        mut logs: SharedLog,
    ) -> Result<String, ContainerError> {
        self.record(EngineCall::Run {
            image: spec.image.clone(),
        });
        let output = {
            let mut state = self.state();
            state.runs.push(spec.clone());
            state.output.clone()
        };
        if !output.is_empty() {
            let _ = logs.write_all(output.as_bytes());
        }
        Ok(format!("fake-{}", self.state().runs.len()))
    }

    async fn wait(&self, id: &str) -> Result<(), ContainerError> {
        self.record(EngineCall::Wait { id: id.to_string() });
        let block = self.state().block_until_stopped;
        if block {
            self.stopped.cancelled().await;
            return Err(ContainerError::Exited { exit_code: 137 });
        }
        match self.state().exit_code {
            0 => Ok(()),
            exit_code => Err(ContainerError::Exited { exit_code }),
        }
    }

    async fn stop(&self, id: &str) -> Result<(), ContainerError> {
        self.record(EngineCall::Stop { id: id.to_string() });
        self.stopped.cancel();
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
