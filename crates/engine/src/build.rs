// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build-cache procedure
//!
//! Images are keyed by the build identity. The local target keeps them in
//! the daemon's image store; other targets replay a layer diff fetched from
//! storage and publish the diff of every image they build.

use crate::error::{ExecutorError, Phase, PhaseExt, StepError};
use crate::runspec::environment;
use crate::runtime::Shared;
use indicatif::HumanBytes;
use jr_adapters::logs::StreamWriter;
use jr_adapters::{Backend, ContainerEngine, ContainerError, RepoAdapter, SharedLog};
use jr_core::{shell_commands, BuildPolicy, BuildSpec, ContainerSpec, ErrorCode, Job};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

/// Storage key of a build's layer diff
pub fn diff_key(job: &Job, digest: &str) -> String {
    format!("builds/{}/{}.tar", job.repo_id, digest)
}

/// Tag of a built image
pub fn image_name(digest: &str) -> String {
    format!("jr/build:{digest}")
}

/// Progress line on the live stream; the stream never fails the build
fn progress(stream: &mut StreamWriter, line: &str) {
    let _ = writeln!(stream, "{line}");
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or_default()
}

pub(crate) fn build_spec(
    job: &Job,
    spec: &ContainerSpec,
    job_dir: &Path,
    secrets: &HashMap<String, String>,
) -> BuildSpec {
    BuildSpec {
        base_image: spec.image.clone(),
        work_dir: spec.work_dir.clone(),
        configuration_path: job.configuration_path.clone(),
        configuration_type: job.configuration_type.clone(),
        commands: shell_commands(&job.all_build_commands()),
        entrypoint: spec.entrypoint.clone(),
        env: environment(job, None, secrets).to_vec(),
        registry_auth_base64: spec.registry_auth_base64.clone(),
        repo_path: job_dir.to_path_buf(),
    }
}

/// Resolve the run image, building it when the policy allows.
///
/// On success `spec.image` names the image the container runs.
pub(crate) async fn build_or_reuse<B, E, R>(
    shared: &Shared<B, E, R>,
    spec: &mut ContainerSpec,
    logs: SharedLog,
) -> Result<(), ExecutorError>
where
    B: Backend,
    E: ContainerEngine,
    R: RepoAdapter,
{
    let backend = &shared.backend;
    let engine = &shared.engine;
    let job = shared.job();
    let is_local = backend.is_local();
    let mut stream = shared.config.stream.writer();

    let secrets = backend.secrets(&job).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to fetch secrets");
        HashMap::new()
    });
    let build = build_spec(&job, spec, &shared.job_dir(&job), &secrets);
    let digest = engine.build_digest(&build);
    let key = diff_key(&job, &digest);
    let image = image_name(&digest);

    let scratch = tempfile::Builder::new()
        .prefix("jr-build-")
        .tempdir()
        .phase(Phase::Build)?;
    let diff_path = scratch.path().join("layer.tar");

    if job.build_policy.looks_up_cache() {
        tracing::debug!(key = %key, image = %image, "looking up build cache");
        progress(&mut stream, "Looking for the image...");
        if is_local {
            if engine.image_exists(&image).await.phase(Phase::Build)? {
                progress(&mut stream, "Using the image from the cache\n");
                spec.image = image;
                return Ok(());
            }
        } else if backend
            .build_diff(&key, &diff_path)
            .await
            .phase(Phase::Build)?
        {
            let size = HumanBytes(file_size(&diff_path));
            progress(&mut stream, &format!("Loading the image ({size})..."));
            engine
                .import_image_diff(&diff_path)
                .await
                .phase(Phase::Build)?;
            progress(&mut stream, "The image is loaded\n");
            spec.image = image;
            return Ok(());
        }
        progress(&mut stream, "No image is found\n");

        if job.build_policy == BuildPolicy::UseBuild && !job.build_commands.is_empty() {
            shared.update_job(|job| job.error_code = Some(ErrorCode::BuildNotFound));
            if let Err(e) = shared.push().await {
                tracing::error!(error = %e, "failed to push build-not-found");
            }
            return Err(StepError::BuildNotFound { digest }).phase(Phase::Build);
        }
    }

    if !job.build_policy.may_build() {
        return Ok(());
    }
    if build.commands.is_empty() {
        tracing::info!("no build commands, running the base image");
        return Ok(());
    }

    match engine.build(&build, &image, shared.stop.token(), logs).await {
        Err(ContainerError::BuildStopped) => return Err(ExecutorError::Stopped),
        result => result.phase(Phase::Build)?,
    }

    if !is_local {
        progress(&mut stream, "Saving the image...");
        engine
            .export_image_diff(&image, &diff_path)
            .await
            .phase(Phase::Build)?;
        let size = HumanBytes(file_size(&diff_path));
        tracing::info!(key = %key, size = %size, "storing build diff");
        progress(&mut stream, &format!("Uploading the image ({size})..."));
        backend
            .put_build_diff(&diff_path, &key)
            .await
            .phase(Phase::Build)?;
    }
    spec.image = image;
    Ok(())
}

#[cfg(test)]
#[path = "build_tests.rs"]
mod tests;
