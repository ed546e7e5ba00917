// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assembly of the immutable container spec for a job

use crate::error::{ExecutorError, Phase, PhaseExt};
use crate::resolve::ArtifactSet;
use crate::runtime::Shared;
use jr_adapters::container::encode_registry_auth;
use jr_adapters::{Backend, ContainerEngine, RepoAdapter};
use jr_core::config::CONFIG_FILE_NAME;
use jr_core::{
    ports, shell_commands, unique_mounts, ContainerSpec, Environment, ErrorCode, GitCredentials,
    GitProtocol, Job, Mount, RepoType, VariablesInterpolator, WORKFLOW_DIR,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

const DEFAULT_HOME: &str = "/root";

/// Credentials file exposed to the container, removed when dropped
pub(crate) struct CredentialsFile {
    path: PathBuf,
}

impl CredentialsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `content` readable by the owner only
    pub fn write(&self, content: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600)
            .open(&self.path)?;
        file.write_all(content.as_bytes())
    }
}

impl Drop for CredentialsFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove credentials");
            }
        }
    }
}

/// Where run-only variables come from
pub(crate) struct RunScope<'a> {
    pub hostname: Option<&'a str>,
    pub master: Option<&'a Job>,
}

/// Container environment.
///
/// The build environment (`run == None`) holds only the job's own variables
/// and secrets, so run-scoped constants never change the build identity.
pub(crate) fn environment(
    job: &Job,
    run: Option<RunScope<'_>>,
    secrets: &HashMap<String, String>,
) -> Environment {
    let mut env = Environment::new();
    if let Some(scope) = run {
        env.add("PYTHONUNBUFFERED", "1");
        env.add("JR_REPO", &job.repo_id);
        env.add("JOB_ID", &job.job_id);
        env.add("RUN_NAME", &job.run_name);
        if let Some(hostname) = scope.hostname {
            env.add("JOB_HOSTNAME", hostname);
            env.add("HOSTNAME", hostname);
        }
        if let Some(master) = scope.master {
            env.add("MASTER_ID", &master.job_id);
            env.add("MASTER_HOSTNAME", &master.host_name);
            env.add("MASTER_JOB_ID", &master.job_id);
            env.add("MASTER_JOB_HOSTNAME", &master.host_name);
        }
        env.add_all(&job.run_environment);
    }
    env.add_all(&job.environment);
    env.add_all(secrets);
    env
}

/// Container working directory for the job
pub(crate) fn container_workdir(job: &Job) -> String {
    let relative = job.working_dir.trim_start_matches("./").trim_matches('/');
    if relative.is_empty() || relative == "." {
        WORKFLOW_DIR.to_string()
    } else {
        format!("{WORKFLOW_DIR}/{relative}")
    }
}

/// Registry auth blob with secret placeholders resolved; `None` when empty
pub(crate) fn registry_auth(job: &Job, secrets: &HashMap<String, String>) -> Option<String> {
    let mut interpolator = VariablesInterpolator::new();
    interpolator.add("secrets", secrets.clone());
    let resolve = |field: &str, value: &str| match interpolator.interpolate(value) {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::error!(field, error = %e, "registry auth interpolation failed");
            String::new()
        }
    };
    let username = resolve("username", &job.registry_auth.username);
    let password = resolve("password", &job.registry_auth.password);
    encode_registry_auth(&username, &password)
}

/// Credentials file contents and its target inside the container
pub(crate) fn git_credentials_mount(
    creds: &GitCredentials,
    host: &str,
    home: &str,
) -> Option<(String, String)> {
    let home = home.trim_end_matches('/');
    match creds.protocol {
        GitProtocol::Ssh => creds
            .private_key
            .as_ref()
            .map(|key| (key.clone(), format!("{home}/.ssh/id_rsa"))),
        GitProtocol::Https => creds.oauth_token.as_ref().map(|token| {
            (
                format!("{host}:\n  oauth_token: \"{token}\"\n"),
                format!("{home}/.config/gh/hosts.yml"),
            )
        }),
    }
}

/// Assemble the run spec, allocating app ports and writing credentials.
///
/// Allocated host ports are written back to the job's apps and pushed.
pub(crate) async fn assemble<B, E, R>(
    shared: &Shared<B, E, R>,
    artifacts: &ArtifactSet,
    creds_file: &CredentialsFile,
) -> Result<ContainerSpec, ExecutorError>
where
    B: Backend,
    E: ContainerEngine,
    R: RepoAdapter,
{
    let backend = &shared.backend;
    let job = shared.job();
    let is_local = backend.is_local();
    let workdir = container_workdir(&job);
    let home = job.home_dir.clone().unwrap_or_else(|| DEFAULT_HOME.to_string());

    let secrets = backend.secrets(&job).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to fetch secrets");
        HashMap::new()
    });
    let master = backend.master_job(&job).await.phase(Phase::Spec)?;
    let env = environment(
        &job,
        Some(RunScope {
            hostname: shared.config.runner.hostname.as_deref(),
            master: master.as_ref(),
        }),
        &secrets,
    );

    let mut mounts = vec![
        Mount::bind(shared.job_dir(&job), WORKFLOW_DIR),
        Mount::bind(
            shared.config.config_dir.join(CONFIG_FILE_NAME),
            format!("{}/.jr/{CONFIG_FILE_NAME}", home.trim_end_matches('/')),
        ),
    ];
    mounts.extend(backend.docker_bindings());
    mounts.extend(artifacts.bindings(&workdir).phase(Phase::Spec)?);

    if job.repo_type == RepoType::Remote && job.home_dir.is_some() {
        if let Some(creds) = backend.git_credentials(&job).await.phase(Phase::Spec)? {
            let host = job.repo_host_name_with_port();
            if let Some((content, target)) = git_credentials_mount(&creds, &host, &home) {
                creds_file.write(&content).phase(Phase::Spec)?;
                mounts.push(Mount::bind(creds_file.path(), target));
            }
        }
    }

    let exposed_ports = ports::exposed_ports(&job.apps, is_local);
    let binding_ports = match ports::binding_ports(&job.apps, is_local) {
        Ok(bindings) => bindings,
        Err(e) => {
            tracing::error!(error = %e, "app port binding failed");
            shared.update_job(|job| job.error_code = Some(ErrorCode::PortsBindingFailed));
            if let Err(push) = shared.push().await {
                tracing::error!(error = %push, "failed to push port binding failure");
            }
            return Err(e).phase(Phase::Spec);
        }
    };
    if !binding_ports.is_empty() {
        shared.update_job(|job| {
            for app in &mut job.apps {
                if let Some(binding) = binding_ports
                    .iter()
                    .find(|b| b.container_port == app.port)
                {
                    app.map_to_port = Some(binding.host_port);
                }
            }
        });
        shared.push().await?;
    }

    let requirements = backend.requirements(&job);
    Ok(ContainerSpec {
        image: job.image.clone(),
        registry_auth_base64: registry_auth(&job, &secrets),
        work_dir: workdir,
        commands: shell_commands(&job.commands),
        entrypoint: job.entrypoint.clone(),
        env: env.to_vec(),
        mounts: unique_mounts(mounts),
        exposed_ports,
        binding_ports,
        cpus: requirements.cpus,
        memory_mib: requirements.memory_mib,
        shm_size_mib: requirements.shm_size_mib,
        gpus: requirements.gpus.map(|g| g.count),
        allow_host_mode: !is_local,
    })
}

#[cfg(test)]
#[path = "runspec_tests.rs"]
mod tests;
