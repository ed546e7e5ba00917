// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::container::FakeEngine;
use crate::repo::FakeRepoAdapter;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

/// A writer that captures log output for testing
#[derive(Clone, Default)]
struct CapturedLogs {
    logs: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    fn new() -> Self {
        Self::default()
    }

    fn contents(&self) -> String {
        let logs = self.logs.lock().unwrap();
        String::from_utf8_lossy(&logs).to_string()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.logs.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run a test with captured tracing output
fn with_tracing<F, Fut>(f: F) -> (String, Fut::Output)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future,
{
    let logs = CapturedLogs::new();
    let logs_clone = logs.clone();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_writer(logs_clone)
        .with_ansi(false)
        .without_time()
        .finish();

    let result = tracing::subscriber::with_default(subscriber, || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f())
    });

    (logs.contents(), result)
}

// =============================================================================
// Precondition validation tests
// =============================================================================

#[tokio::test]
async fn traced_repo_rejects_missing_checkout_dir() {
    let traced = TracedRepoAdapter::new(FakeRepoAdapter::new());

    let result = traced
        .checkout(&RepoSource::default(), Path::new("/nonexistent/checkout"))
        .await;

    let err = result.unwrap_err();
    assert!(
        err.to_string().contains("checkout directory does not exist"),
        "Expected error about checkout directory, got: {}",
        err
    );
}

// =============================================================================
// Tracing output verification tests
// =============================================================================

#[test]
fn traced_build_logs_entry_and_completion() {
    let (logs, result) = with_tracing(|| async {
        let traced = TracedEngine::new(FakeEngine::new());
        let spec = BuildSpec {
            base_image: "python:3.11".to_string(),
            commands: vec!["pip install -r requirements.txt".to_string()],
            ..Default::default()
        };
        traced
            .build(
                &spec,
                "jr/build:abc",
                &CancellationToken::new(),
                SharedLog::sink(),
            )
            .await
    });

    assert!(result.is_ok(), "build should succeed: {:?}", result);
    assert!(logs.contains("engine.build"), "Logs:\n{}", logs);
    assert!(logs.contains("jr/build:abc"), "Logs:\n{}", logs);
    assert!(logs.contains("image built"), "Logs:\n{}", logs);
    assert!(logs.contains("elapsed_ms"), "Logs:\n{}", logs);
}

#[test]
fn traced_wait_logs_container_failure() {
    let (logs, result) = with_tracing(|| async {
        let fake = FakeEngine::new();
        fake.set_exit_code(3);
        let traced = TracedEngine::new(fake);
        let id = traced
            .run(&ContainerSpec::default(), SharedLog::sink())
            .await
            .unwrap();
        traced.wait(&id).await
    });

    assert_eq!(result.unwrap_err().exit_code(), Some(3));
    assert!(logs.contains("container started"), "Logs:\n{}", logs);
    assert!(logs.contains("container failed"), "Logs:\n{}", logs);
    assert!(logs.contains("code 3"), "Logs:\n{}", logs);
}

#[test]
fn traced_checkout_logs_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_path_buf();
    let (logs, result) = with_tracing(|| async move {
        let traced = TracedRepoAdapter::new(FakeRepoAdapter::new());
        let source = RepoSource {
            url: "https://github.com/org/repo.git".to_string(),
            branch: "main".to_string(),
            hash: "abc123".to_string(),
            ..Default::default()
        };
        traced.checkout(&source, &path).await
    });

    assert!(result.is_ok());
    assert!(logs.contains("repo.checkout"), "Logs:\n{}", logs);
    assert!(logs.contains("abc123"), "Logs:\n{}", logs);
    assert!(logs.contains("checked out"), "Logs:\n{}", logs);
}
