// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn fake_checkout_writes_files_and_records() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = FakeRepoAdapter::new().with_file("train.py", "print('hi')");
    let source = RepoSource {
        url: "https://github.com/org/repo.git".to_string(),
        ..Default::default()
    };

    adapter.checkout(&source, dir.path()).await.unwrap();
    adapter
        .set_identity(dir.path(), "Bob", "bob@example.com")
        .await
        .unwrap();

    assert!(dir.path().join("train.py").exists());
    let calls = adapter.calls();
    assert_eq!(calls.len(), 2);
    assert!(matches!(&calls[0], RepoCall::Checkout { source: s, .. } if s.url == source.url));
}

#[tokio::test]
async fn fake_checkout_can_fail() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = FakeRepoAdapter::new();
    adapter.fail_checkout();
    let result = adapter.checkout(&RepoSource::default(), dir.path()).await;
    assert!(matches!(result, Err(RepoError::CloneFailed { .. })));
}
