// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container and build descriptors
//!
//! Both are assembled once per job and not mutated afterwards, except that
//! the build phase may swap the run image for a cached build.

use crate::ports::PortBinding;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;

/// Container path the staged repository is mounted at
pub const WORKFLOW_DIR: &str = "/workflow";

/// A bind mount from the host into the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub source: PathBuf,
    pub target: String,
    #[serde(default)]
    pub read_only: bool,
}

impl Mount {
    pub fn bind(source: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }
}

/// Everything needed to start the job's container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image: String,
    pub registry_auth_base64: Option<String>,
    pub work_dir: String,
    pub commands: Vec<String>,
    pub entrypoint: Vec<String>,
    /// `KEY=VALUE` pairs
    pub env: Vec<String>,
    pub mounts: Vec<Mount>,
    pub exposed_ports: Vec<u16>,
    pub binding_ports: Vec<PortBinding>,
    pub cpus: Option<u32>,
    pub memory_mib: Option<u64>,
    pub shm_size_mib: Option<u64>,
    pub gpus: Option<u32>,
    pub allow_host_mode: bool,
}

/// Everything needed to build (or find a cached build of) the job's image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    pub base_image: String,
    pub work_dir: String,
    pub configuration_path: String,
    pub configuration_type: String,
    pub commands: Vec<String>,
    pub entrypoint: Vec<String>,
    /// `KEY=VALUE` pairs
    pub env: Vec<String>,
    pub registry_auth_base64: Option<String>,
    /// Host path of the staged repository, mounted during the build
    pub repo_path: PathBuf,
}

impl BuildSpec {
    /// Content-derived build identity.
    ///
    /// Covers base image, working dir, configuration identity, build commands,
    /// entrypoint and environment (order-insensitive). Registry credentials and
    /// the host repo path are excluded so they never split the cache.
    pub fn digest(&self) -> String {
        let mut env = self.env.clone();
        env.sort();

        let mut hasher = Sha256::new();
        hash_field(&mut hasher, "base_image", &[&self.base_image]);
        hash_field(&mut hasher, "work_dir", &[&self.work_dir]);
        hash_field(&mut hasher, "configuration_path", &[&self.configuration_path]);
        hash_field(&mut hasher, "configuration_type", &[&self.configuration_type]);
        hash_field(&mut hasher, "commands", &as_strs(&self.commands));
        hash_field(&mut hasher, "entrypoint", &as_strs(&self.entrypoint));
        hash_field(&mut hasher, "env", &as_strs(&env));
        format!("{:x}", hasher.finalize())
    }
}

fn as_strs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

// Length-prefixed so that no two distinct field values share an encoding
fn hash_field(hasher: &mut Sha256, name: &str, values: &[&str]) {
    hasher.update(name.as_bytes());
    hasher.update((values.len() as u64).to_le_bytes());
    for value in values {
        hasher.update((value.len() as u64).to_le_bytes());
        hasher.update(value.as_bytes());
    }
}

/// Collapse mounts sharing a target; the later mount wins.
///
/// The result keeps the position where each target was first seen.
pub fn unique_mounts(mounts: Vec<Mount>) -> Vec<Mount> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut result: Vec<Mount> = Vec::with_capacity(mounts.len());
    for mount in mounts {
        match index.get(&mount.target) {
            Some(&i) => result[i] = mount,
            None => {
                index.insert(mount.target.clone(), result.len());
                result.push(mount);
            }
        }
    }
    result
}

/// Wrap a command list into a single shell invocation
pub fn shell_commands(commands: &[String]) -> Vec<String> {
    if commands.is_empty() {
        return Vec::new();
    }
    vec![
        "/bin/sh".to_string(),
        "-c".to_string(),
        commands.join(" && "),
    ]
}

#[cfg(test)]
#[path = "spec_tests.rs"]
mod tests;
