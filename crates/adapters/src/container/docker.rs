// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker CLI container engine

use super::{decode_registry_auth, registry_host, ContainerEngine, ContainerError};
use crate::logs::SharedLog;
use async_trait::async_trait;
use jr_core::{shell_commands, BuildSpec, ContainerSpec, Mount, WORKFLOW_DIR};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::process::{Output, Stdio};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Container engine driving the `docker` binary
#[derive(Clone)]
pub struct DockerEngine {
    binary: String,
    /// Log followers of running containers, awaited by `wait`
    followers: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl Default for DockerEngine {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            followers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.stdin(Stdio::null());
        cmd
    }

    async fn checked(&self, args: &[String]) -> Result<Output, ContainerError> {
        let output = self
            .command()
            .args(args)
            .output()
            .await
            .map_err(|e| ContainerError::CommandFailed(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ContainerError::CommandFailed(stderr.trim().to_string()));
        }
        Ok(output)
    }

    async fn login(&self, auth_base64: &str, image: &str) -> Result<(), ContainerError> {
        let creds = decode_registry_auth(auth_base64)?;
        let mut args = vec![
            "login".to_string(),
            "--username".to_string(),
            creds.username,
            "--password-stdin".to_string(),
        ];
        if let Some(host) = registry_host(image) {
            args.push(host.to_string());
        }
        let mut child = self
            .command()
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ContainerError::CommandFailed(e.to_string()))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(creds.password.as_bytes())
                .await
                .map_err(|e| ContainerError::CommandFailed(e.to_string()))?;
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ContainerError::CommandFailed(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ContainerError::CommandFailed(format!(
                "docker login: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }

    /// Run `args` to completion, streaming stdout and stderr into `logs`
    async fn streamed(&self, args: &[String], logs: SharedLog) -> Result<i64, ContainerError> {
        let mut child = self
            .command()
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ContainerError::CommandFailed(e.to_string()))?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        tokio::join!(pipe(stdout, logs.clone()), pipe(stderr, logs));
        let status = child
            .wait()
            .await
            .map_err(|e| ContainerError::CommandFailed(e.to_string()))?;
        Ok(status.code().map(i64::from).unwrap_or(-1))
    }

    async fn image_config(&self, image: &str) -> Result<ImageConfig, ContainerError> {
        let args = vec![
            "image".to_string(),
            "inspect".to_string(),
            "--format".to_string(),
            "{{json .Config}}".to_string(),
            image.to_string(),
        ];
        let output = self.checked(&args).await?;
        serde_json::from_slice(&output.stdout).map_err(|e| {
            ContainerError::CommandFailed(format!("unexpected image config for {image}: {e}"))
        })
    }

    fn follow(&self, id: &str, logs: SharedLog) {
        let args = vec!["logs".to_string(), "-f".to_string(), id.to_string()];
        let engine = self.clone();
        let container = id.to_string();
        let handle = tokio::spawn(async move {
            if let Err(e) = engine.streamed(&args, logs).await {
                tracing::warn!(container, error = %e, "log follower failed");
            }
        });
        self.followers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string(), handle);
    }
}

async fn pipe<R: AsyncRead + Unpin>(reader: Option<R>, mut logs: SharedLog) {
    let Some(mut reader) = reader else {
        return;
    };
    let mut buf = [0u8; 8192];
    let mut warned = false;
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if let Err(e) = logs.write_all(&buf[..n]) {
                    if !warned {
                        tracing::warn!(error = %e, "log sink write failed");
                        warned = true;
                    }
                }
            }
        }
    }
}

fn mount_arg(mount: &Mount) -> String {
    let mut arg = format!(
        "type=bind,source={},target={}",
        mount.source.display(),
        mount.target
    );
    if mount.read_only {
        arg.push_str(",readonly");
    }
    arg
}

/// Arguments of the `docker run -d` call starting the job's container
pub fn run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec!["run".to_string(), "-d".to_string()];
    if !spec.work_dir.is_empty() {
        args.extend(["-w".to_string(), spec.work_dir.clone()]);
    }
    for var in &spec.env {
        args.extend(["-e".to_string(), var.clone()]);
    }
    for mount in &spec.mounts {
        args.extend(["--mount".to_string(), mount_arg(mount)]);
    }
    for port in &spec.exposed_ports {
        args.extend(["--expose".to_string(), port.to_string()]);
    }
    for binding in &spec.binding_ports {
        args.extend([
            "-p".to_string(),
            format!("{}:{}", binding.host_port, binding.container_port),
        ]);
    }
    if spec.allow_host_mode && spec.binding_ports.is_empty() {
        args.extend(["--network".to_string(), "host".to_string()]);
    }
    if let Some(cpus) = spec.cpus {
        args.extend(["--cpus".to_string(), cpus.to_string()]);
    }
    if let Some(memory) = spec.memory_mib {
        args.extend(["--memory".to_string(), format!("{memory}m")]);
    }
    if let Some(shm) = spec.shm_size_mib {
        args.extend(["--shm-size".to_string(), format!("{shm}m")]);
    }
    if let Some(gpus) = spec.gpus.filter(|n| *n > 0) {
        args.extend(["--gpus".to_string(), gpus.to_string()]);
    }
    let mut entrypoint = spec.entrypoint.iter();
    if let Some(program) = entrypoint.next() {
        args.extend(["--entrypoint".to_string(), program.clone()]);
    }
    args.push(spec.image.clone());
    args.extend(entrypoint.cloned());
    args.extend(spec.commands.iter().cloned());
    args
}

/// Arguments of the `docker run` call executing the build commands.
///
/// `spec.commands` is a complete argv (`/bin/sh -c <script>`); its program
/// becomes the entrypoint and the rest follows the image.
pub fn build_args(spec: &BuildSpec, name: &str) -> Vec<String> {
    let repo = Mount::bind(spec.repo_path.clone(), WORKFLOW_DIR);
    let mut args = vec![
        "run".to_string(),
        "--name".to_string(),
        name.to_string(),
        "--mount".to_string(),
        mount_arg(&repo),
    ];
    if !spec.work_dir.is_empty() {
        args.extend(["-w".to_string(), spec.work_dir.clone()]);
    }
    for var in &spec.env {
        args.extend(["-e".to_string(), var.clone()]);
    }
    let argv = if spec.commands.is_empty() {
        shell_commands(&["true".to_string()])
    } else {
        spec.commands.clone()
    };
    let mut argv = argv.into_iter();
    if let Some(program) = argv.next() {
        args.extend(["--entrypoint".to_string(), program]);
    }
    args.push(spec.base_image.clone());
    args.extend(argv);
    args
}

/// Entrypoint and command of an image, as reported by `docker image inspect`
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageConfig {
    #[serde(default)]
    pub entrypoint: Option<Vec<String>>,
    #[serde(default)]
    pub cmd: Option<Vec<String>>,
}

fn exec_form(argv: Option<&[String]>) -> String {
    match argv {
        Some(argv) => serde_json::to_string(argv).unwrap_or_else(|_| "[]".to_string()),
        None => "[]".to_string(),
    }
}

/// Arguments of the `docker commit` call tagging a finished build.
///
/// The build container runs under the build entrypoint, so the base image's
/// own entrypoint and command are written back onto the committed image.
pub fn commit_args(spec: &BuildSpec, base: &ImageConfig, name: &str, image: &str) -> Vec<String> {
    let mut args = vec!["commit".to_string()];
    if !spec.work_dir.is_empty() {
        args.extend(["--change".to_string(), format!("WORKDIR {}", spec.work_dir)]);
    }
    args.extend([
        "--change".to_string(),
        format!("ENTRYPOINT {}", exec_form(base.entrypoint.as_deref())),
        "--change".to_string(),
        format!("CMD {}", exec_form(base.cmd.as_deref())),
        name.to_string(),
        image.to_string(),
    ]);
    args
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn image_exists(&self, image: &str) -> Result<bool, ContainerError> {
        let status = self
            .command()
            .args(["image", "inspect", "--format", "{{.Id}}", image])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| ContainerError::CommandFailed(e.to_string()))?;
        Ok(status.success())
    }

    async fn build(
        &self,
        spec: &BuildSpec,
        image: &str,
        stop: &CancellationToken,
        logs: SharedLog,
    ) -> Result<(), ContainerError> {
        if stop.is_cancelled() {
            return Err(ContainerError::BuildStopped);
        }
        if let Some(auth) = &spec.registry_auth_base64 {
            self.login(auth, &spec.base_image).await?;
        }

        let name = format!("jr-build-{}", uuid::Uuid::new_v4().simple());
        let exit_code = self.streamed(&build_args(spec, &name), logs).await?;
        if exit_code != 0 {
            let _ = self.checked(&["rm".into(), "-f".into(), name]).await;
            return Err(ContainerError::BuildFailed { exit_code });
        }

        let committed = match self.image_config(&spec.base_image).await {
            Ok(base) => self
                .checked(&commit_args(spec, &base, &name, image))
                .await
                .map(drop),
            Err(e) => Err(e),
        };
        let _ = self.checked(&["rm".into(), "-f".into(), name]).await;
        committed
    }

    async fn export_image_diff(&self, image: &str, dst: &Path) -> Result<(), ContainerError> {
        let args = vec![
            "save".to_string(),
            "-o".to_string(),
            dst.display().to_string(),
            image.to_string(),
        ];
        self.checked(&args).await.map(drop)
    }

    async fn import_image_diff(&self, src: &Path) -> Result<(), ContainerError> {
        let args = vec![
            "load".to_string(),
            "-i".to_string(),
            src.display().to_string(),
        ];
        self.checked(&args).await.map(drop)
    }

    async fn run(&self, spec: &ContainerSpec, logs: SharedLog) -> Result<String, ContainerError> {
        if let Some(auth) = &spec.registry_auth_base64 {
            self.login(auth, &spec.image).await?;
        }
        let output = self.checked(&run_args(spec)).await?;
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(ContainerError::CommandFailed(
                "docker run returned no container id".to_string(),
            ));
        }
        self.follow(&id, logs);
        Ok(id)
    }

    async fn wait(&self, id: &str) -> Result<(), ContainerError> {
        let output = self
            .checked(&["wait".into(), id.to_string()])
            .await
            .map_err(|e| match e {
                ContainerError::CommandFailed(msg) if msg.contains("No such container") => {
                    ContainerError::NoSuchContainer(id.to_string())
                }
                other => other,
            })?;
        let follower = self
            .followers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        if let Some(follower) = follower {
            let _ = follower.await;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let exit_code: i64 = stdout.trim().parse().map_err(|_| {
            ContainerError::CommandFailed(format!("unexpected docker wait output: {stdout}"))
        })?;
        let _ = self.checked(&["rm".into(), id.to_string()]).await;
        if exit_code != 0 {
            return Err(ContainerError::Exited { exit_code });
        }
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<(), ContainerError> {
        self.checked(&["stop".into(), id.to_string()])
            .await
            .map(drop)
    }
}

#[cfg(test)]
#[path = "docker_tests.rs"]
mod tests;
