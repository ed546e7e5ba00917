// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record
//!
//! A job is created by the scheduling tier before the runner starts and is
//! mutated only by the executor while it runs. The field names mirror the
//! record exchanged with the control plane.

use crate::status::JobStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Where the job's source comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepoType {
    /// Git repository cloned at an exact commit
    #[default]
    Remote,
    /// Tar archive uploaded by the CLI
    Local,
}

/// Operator directive on image reuse and building
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BuildPolicy {
    /// Reuse a cached build; never build
    #[default]
    UseBuild,
    /// Reuse a cached build, build on miss
    Build,
    /// Always build
    ForceBuild,
    /// Build, store, and do not run
    BuildOnly,
}

impl BuildPolicy {
    /// Whether a cache lookup is attempted before building
    pub fn looks_up_cache(&self) -> bool {
        matches!(self, BuildPolicy::UseBuild | BuildPolicy::Build)
    }

    /// Whether the build procedure may run
    pub fn may_build(&self) -> bool {
        matches!(
            self,
            BuildPolicy::Build | BuildPolicy::ForceBuild | BuildPolicy::BuildOnly
        )
    }

    /// Whether the container runs after the build phase
    pub fn runs_container(&self) -> bool {
        !matches!(self, BuildPolicy::BuildOnly)
    }
}

impl fmt::Display for BuildPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildPolicy::UseBuild => "use-build",
            BuildPolicy::Build => "build",
            BuildPolicy::ForceBuild => "force-build",
            BuildPolicy::BuildOnly => "build-only",
        };
        f.write_str(s)
    }
}

/// Typed failure reason surfaced on the job record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ContainerExitedWithError,
    BuildNotFound,
    PortsBindingFailed,
}

/// A declared output artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub path: String,
    #[serde(default)]
    pub mount: bool,
}

/// A declared cache directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSpec {
    pub path: String,
}

/// A dependency on another run's artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepSpec {
    pub repo_id: String,
    pub run_name: String,
}

impl DepSpec {
    /// Storage prefix listing the dependency run's job records
    pub fn jobs_prefix(&self) -> String {
        format!("jobs/{}/{},", self.repo_id, self.run_name)
    }
}

/// An application port the job exposes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSpec {
    pub port: u16,
    #[serde(default)]
    pub app_name: String,
    /// Host port the app is reachable on, assigned by the runner when absent
    #[serde(default)]
    pub map_to_port: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuRequirements {
    pub count: u32,
    #[serde(default)]
    pub name: Option<String>,
}

/// Compute resources requested for the job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Requirements {
    pub cpus: Option<u32>,
    pub memory_mib: Option<u64>,
    pub gpus: Option<GpuRequirements>,
    pub shm_size_mib: Option<u64>,
    pub interruptible: bool,
}

/// Container registry credentials, possibly holding `${{ secrets.X }}` placeholders
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GitProtocol {
    #[default]
    Https,
    Ssh,
}

/// Credentials for fetching the job's git repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitCredentials {
    pub protocol: GitProtocol,
    pub oauth_token: Option<String>,
    pub private_key: Option<String>,
    pub passphrase: Option<String>,
}

/// The unit of work tracked through its status lifecycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Job {
    pub job_id: String,
    pub run_name: String,
    pub workflow_name: String,
    pub repo_id: String,
    pub hub_user_name: String,
    pub runner_id: String,
    pub master_job_id: Option<String>,
    pub host_name: String,

    pub repo_type: RepoType,
    pub repo_host_name: String,
    pub repo_port: Option<u16>,
    pub repo_user_name: String,
    pub repo_name: String,
    pub repo_branch: String,
    pub repo_hash: String,
    /// Uncommitted diff (remote repos) or archive name (local repos)
    pub repo_code_filename: Option<String>,
    pub repo_config_name: String,
    pub repo_config_email: String,

    pub image: String,
    pub home_dir: Option<String>,
    pub working_dir: String,
    pub entrypoint: Vec<String>,
    pub commands: Vec<String>,
    pub build_commands: Vec<String>,
    pub optional_build_commands: Vec<String>,
    pub configuration_path: String,
    pub configuration_type: String,
    pub build_policy: BuildPolicy,

    pub environment: BTreeMap<String, String>,
    pub run_environment: BTreeMap<String, String>,
    pub apps: Vec<AppSpec>,
    pub artifacts: Vec<ArtifactSpec>,
    pub cache: Vec<CacheSpec>,
    pub deps: Vec<DepSpec>,
    pub requirements: Requirements,
    pub registry_auth: RegistryAuth,

    pub status: JobStatus,
    pub error_code: Option<ErrorCode>,
    pub container_exit_code: Option<i64>,
}

impl Job {
    /// Repository host, with the port appended when one is set
    pub fn repo_host_name_with_port(&self) -> String {
        match self.repo_port {
            Some(port) => format!("{}:{}", self.repo_host_name, port),
            None => self.repo_host_name.clone(),
        }
    }

    /// Storage key of one of this job's output artifacts
    pub fn artifact_key(&self, path: &str) -> String {
        format!("artifacts/{}/{}/{}", self.repo_id, self.job_id, path)
    }

    /// Storage key of a cache directory, shared by every run of the workflow
    pub fn cache_key(&self, path: &str) -> String {
        format!(
            "cache/{}/{}/{}/{}",
            self.repo_id, self.hub_user_name, self.workflow_name, path
        )
    }

    /// Storage key of this job's record
    pub fn record_key(&self) -> String {
        format!("jobs/{}/{},{}.json", self.repo_id, self.run_name, self.job_id)
    }

    /// Build commands in execution order: mandatory then optional
    pub fn all_build_commands(&self) -> Vec<String> {
        self.build_commands
            .iter()
            .chain(self.optional_build_commands.iter())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
