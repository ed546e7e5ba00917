// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use base64::Engine as _;
use std::path::PathBuf;

#[test]
fn token_header_is_basic_auth_for_x_access_token() {
    let header = token_header("abc");
    let encoded = header.strip_prefix("AUTHORIZATION: basic ").unwrap();
    let decoded = STANDARD.decode(encoded).unwrap();
    assert_eq!(decoded, b"x-access-token:abc");
}

#[test]
fn clone_args_include_branch_when_set() {
    let source = RepoSource {
        url: "https://github.com/org/repo.git".to_string(),
        branch: "main".to_string(),
        hash: "abc123".to_string(),
        auth: RepoAuth::Anonymous,
    };
    let args = clone_args(&source, &PathBuf::from("/tmp/runs/r/j"));
    assert_eq!(
        args,
        [
            "clone",
            "--branch",
            "main",
            "https://github.com/org/repo.git",
            "/tmp/runs/r/j"
        ]
    );

    let detached = RepoSource {
        branch: String::new(),
        ..source
    };
    assert!(!clone_args(&detached, Path::new("/d")).contains(&"--branch".to_string()));
}

#[test]
fn token_auth_adds_extra_header_config() {
    let setup = AuthSetup::prepare(&RepoAuth::Token("t0k".to_string())).unwrap();
    assert_eq!(setup.config.len(), 1);
    assert!(setup.config[0].starts_with("http.extraHeader=AUTHORIZATION: basic "));
    assert!(setup.env.is_empty());
}

#[test]
fn ssh_auth_writes_a_private_key_file_removed_on_drop() {
    let setup = AuthSetup::prepare(&RepoAuth::Ssh {
        private_key: "KEY".to_string(),
        passphrase: Some("pw".to_string()),
    })
    .unwrap();
    let ssh_command = &setup
        .env
        .iter()
        .find(|(k, _)| k == "GIT_SSH_COMMAND")
        .unwrap()
        .1;
    let key_path = PathBuf::from(ssh_command.split_whitespace().nth(2).unwrap());
    assert_eq!(std::fs::read_to_string(&key_path).unwrap(), "KEY\n");
    let mode = std::fs::metadata(&key_path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);
    assert!(setup
        .env
        .iter()
        .any(|(k, v)| k == "JR_SSH_PASSPHRASE" && v == "pw"));

    drop(setup);
    assert!(!key_path.exists());
}

#[test]
fn ssh_auth_without_passphrase_skips_askpass() {
    let setup = AuthSetup::prepare(&RepoAuth::Ssh {
        private_key: "KEY\n".to_string(),
        passphrase: None,
    })
    .unwrap();
    assert!(!setup.env.iter().any(|(k, _)| k == "SSH_ASKPASS"));
}

#[tokio::test]
async fn empty_diff_is_a_no_op() {
    let adapter = GitAdapter::new("/nonexistent/git");
    adapter.apply_diff(Path::new("/tmp"), "  \n").await.unwrap();
}

#[tokio::test]
async fn missing_binary_fails_clone() {
    let adapter = GitAdapter::new("/nonexistent/git");
    let dir = tempfile::tempdir().unwrap();
    let result = adapter
        .checkout(
            &RepoSource {
                url: "https://example.invalid/r.git".to_string(),
                ..Default::default()
            },
            dir.path(),
        )
        .await;
    assert!(matches!(result, Err(RepoError::CommandFailed(_))));
}
