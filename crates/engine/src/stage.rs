// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repository staging: git checkout or archive extraction

use crate::error::StepError;
use jr_adapters::{Backend, RepoAdapter, RepoAuth, RepoSource};
use jr_core::{GitCredentials, GitProtocol, Job, RepoType};
use std::path::Path;

/// Stage the job's source into `dir`, creating it first
pub(crate) async fn stage_repository<B: Backend, R: RepoAdapter>(
    backend: &B,
    repos: &R,
    job: &Job,
    dir: &Path,
) -> Result<(), StepError> {
    tokio::fs::create_dir_all(dir).await?;
    match job.repo_type {
        RepoType::Remote => stage_git(backend, repos, job, dir).await,
        RepoType::Local => {
            let archive = job.repo_code_filename.as_deref().unwrap_or_default();
            tracing::info!(archive, dir = %dir.display(), "unpacking repository archive");
            backend.repo_archive(job, archive, dir).await?;
            Ok(())
        }
    }
}

async fn stage_git<B: Backend, R: RepoAdapter>(
    backend: &B,
    repos: &R,
    job: &Job,
    dir: &Path,
) -> Result<(), StepError> {
    let creds = backend.git_credentials(job).await?;
    let source = repo_source(job, creds.as_ref());

    repos.checkout(&source, dir).await?;
    repos
        .set_identity(dir, &job.repo_config_name, &job.repo_config_email)
        .await?;

    let diff = match job.repo_code_filename.as_deref() {
        Some(filename) if !filename.is_empty() => backend.repo_diff(job, filename).await?,
        _ => String::new(),
    };
    if !diff.is_empty() {
        repos.apply_diff(dir, &diff).await?;
    }
    Ok(())
}

pub(crate) fn https_url(job: &Job) -> String {
    format!(
        "https://{}/{}/{}.git",
        job.repo_host_name_with_port(),
        job.repo_user_name,
        job.repo_name
    )
}

pub(crate) fn ssh_url(job: &Job) -> String {
    format!(
        "git@{}:{}/{}.git",
        job.repo_host_name, job.repo_user_name, job.repo_name
    )
}

/// Clone source for the job, authenticated by whatever the credentials allow.
///
/// A protocol whose credential is missing falls back to an anonymous HTTPS clone.
pub(crate) fn repo_source(job: &Job, creds: Option<&GitCredentials>) -> RepoSource {
    let anonymous = (https_url(job), RepoAuth::Anonymous);
    let (url, auth) = match creds {
        None => anonymous,
        Some(creds) => match creds.protocol {
            GitProtocol::Https => match &creds.oauth_token {
                Some(token) => (https_url(job), RepoAuth::Token(token.clone())),
                None => {
                    tracing::error!("git credentials select https but carry no oauth token");
                    anonymous
                }
            },
            GitProtocol::Ssh => match &creds.private_key {
                Some(key) => (
                    ssh_url(job),
                    RepoAuth::Ssh {
                        private_key: key.clone(),
                        passphrase: creds.passphrase.clone(),
                    },
                ),
                None => {
                    tracing::error!("git credentials select ssh but carry no private key");
                    anonymous
                }
            },
        },
    };
    RepoSource {
        url,
        branch: job.repo_branch.clone(),
        hash: job.repo_hash.clone(),
        auth,
    }
}

#[cfg(test)]
#[path = "stage_tests.rs"]
mod tests;
