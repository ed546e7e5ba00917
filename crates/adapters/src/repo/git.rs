// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git repository adapter

use super::{RepoAdapter, RepoAuth, RepoError, RepoSource};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::{Output, Stdio};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const ASKPASS_SCRIPT: &str = "#!/bin/sh\nprintf '%s\\n' \"$JR_SSH_PASSPHRASE\"\n";

/// Git-based repository adapter
#[derive(Clone)]
pub struct GitAdapter {
    binary: String,
}

impl Default for GitAdapter {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitAdapter {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, dir: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.binary);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd
    }

    async fn run(&self, dir: &Path, args: &[&str]) -> Result<Output, RepoError> {
        self.command(Some(dir))
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| RepoError::CommandFailed(e.to_string()))
    }
}

/// Header authenticating HTTPS requests with an OAuth token
pub fn token_header(token: &str) -> String {
    let basic = STANDARD.encode(format!("x-access-token:{token}"));
    format!("AUTHORIZATION: basic {basic}")
}

/// Temporary files and settings backing one authenticated git call
#[derive(Default)]
struct AuthSetup {
    config: Vec<String>,
    env: Vec<(String, String)>,
    _files: Vec<TempPath>,
}

impl AuthSetup {
    fn prepare(auth: &RepoAuth) -> Result<Self, RepoError> {
        let mut setup = AuthSetup::default();
        match auth {
            RepoAuth::Anonymous => {}
            RepoAuth::Token(token) => {
                setup
                    .config
                    .push(format!("http.extraHeader={}", token_header(token)));
            }
            RepoAuth::Ssh {
                private_key,
                passphrase,
            } => {
                let mut key = private_key.clone();
                if !key.ends_with('\n') {
                    key.push('\n');
                }
                let key_path = write_temp(&key, 0o600)?;
                setup.env.push((
                    "GIT_SSH_COMMAND".to_string(),
                    format!(
                        "ssh -i {} -o IdentitiesOnly=yes -o StrictHostKeyChecking=no",
                        key_path.display()
                    ),
                ));
                setup._files.push(key_path);

                if let Some(passphrase) = passphrase.as_ref().filter(|p| !p.is_empty()) {
                    let script = write_temp(ASKPASS_SCRIPT, 0o700)?;
                    setup.env.extend([
                        ("SSH_ASKPASS".to_string(), script.display().to_string()),
                        ("SSH_ASKPASS_REQUIRE".to_string(), "force".to_string()),
                        ("DISPLAY".to_string(), ":0".to_string()),
                        ("JR_SSH_PASSPHRASE".to_string(), passphrase.clone()),
                    ]);
                    setup._files.push(script);
                }
            }
        }
        Ok(setup)
    }
}

fn write_temp(content: &str, mode: u32) -> Result<TempPath, RepoError> {
    let io_err = |e: std::io::Error| RepoError::CommandFailed(e.to_string());
    let mut file = tempfile::Builder::new()
        .prefix("jr-git-")
        .tempfile()
        .map_err(io_err)?;
    file.write_all(content.as_bytes()).map_err(io_err)?;
    file.flush().map_err(io_err)?;
    std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(mode)).map_err(io_err)?;
    // Closed so the askpass script can be executed
    Ok(file.into_temp_path())
}

/// Arguments of the clone call, without the auth config
pub fn clone_args(source: &RepoSource, dir: &Path) -> Vec<String> {
    let mut args = vec!["clone".to_string()];
    if !source.branch.is_empty() {
        args.extend(["--branch".to_string(), source.branch.clone()]);
    }
    args.push(source.url.clone());
    args.push(dir.display().to_string());
    args
}

#[async_trait]
impl RepoAdapter for GitAdapter {
    async fn checkout(&self, source: &RepoSource, dir: &Path) -> Result<(), RepoError> {
        let auth = AuthSetup::prepare(&source.auth)?;
        let mut cmd = self.command(None);
        for config in &auth.config {
            cmd.arg("-c").arg(config);
        }
        cmd.args(clone_args(source, dir));
        cmd.envs(auth.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let output = cmd
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| RepoError::CommandFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(RepoError::CloneFailed {
                url: source.url.clone(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        if source.hash.is_empty() {
            return Ok(());
        }
        let output = self.run(dir, &["checkout", &source.hash]).await?;
        if !output.status.success() {
            return Err(RepoError::RevisionNotFound(source.hash.clone()));
        }
        Ok(())
    }

    async fn set_identity(&self, dir: &Path, name: &str, email: &str) -> Result<(), RepoError> {
        for (key, value) in [("user.name", name), ("user.email", email)] {
            if value.is_empty() {
                continue;
            }
            let output = self.run(dir, &["config", key, value]).await?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(RepoError::CommandFailed(stderr.to_string()));
            }
        }
        Ok(())
    }

    async fn apply_diff(&self, dir: &Path, diff: &str) -> Result<(), RepoError> {
        if diff.trim().is_empty() {
            return Ok(());
        }
        let mut child = self
            .command(Some(dir))
            .args(["apply", "--whitespace=nowarn", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RepoError::CommandFailed(e.to_string()))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(diff.as_bytes())
                .await
                .map_err(|e| RepoError::CommandFailed(e.to_string()))?;
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| RepoError::CommandFailed(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RepoError::PatchFailed(stderr.trim().to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;
