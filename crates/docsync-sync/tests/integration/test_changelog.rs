//! Integration tests for change-feed reconciliation
//!
//! - Bootstrap by crawl, then adopt the server token
//! - Remote creations, edits, deletions, renames and moves
//! - Paging through the feed
//! - The stored token only advances over fully applied pages

use docsync_core::ports::{RemoteError, RepositoryCapabilities};
use docsync_remote::{InMemoryRepository, RemoteOp};

use crate::common;

#[tokio::test]
async fn test_first_reconcile_crawls_and_adopts_token() {
    let h = common::setup();
    h.repo.put_file("/docs/readme.txt", b"hello").unwrap();
    assert!(h.token().await.is_none());

    let report = h.changelog().reconcile().await.unwrap();

    assert!(report.success());
    assert_eq!(h.read("readme.txt").as_deref(), Some("hello"));
    assert_eq!(h.token().await, Some(h.repo.latest_sequence().to_string()));
}

#[tokio::test]
async fn test_no_changes_is_a_no_op() {
    let h = common::setup();
    h.repo.put_file("/docs/readme.txt", b"hello").unwrap();
    let changelog = h.changelog();
    changelog.reconcile().await.unwrap();

    h.repo.clear_journal();
    let report = changelog.reconcile().await.unwrap();

    assert!(report.success());
    assert_eq!(report.changes(), 0);
    assert!(h.repo.journal().is_empty());
    assert_eq!(h.repo.downloads(), 0);
}

#[tokio::test]
async fn test_remote_creation_and_edit_are_downloaded() {
    let h = common::setup();
    h.repo.put_file("/docs/readme.txt", b"v1").unwrap();
    let changelog = h.changelog();
    changelog.reconcile().await.unwrap();

    h.repo.put_file("/docs/readme.txt", b"v2").unwrap();
    h.repo.put_file("/docs/sub/new.txt", b"new").unwrap();
    h.repo.clear_journal();
    let report = changelog.reconcile().await.unwrap();

    assert!(report.success());
    assert_eq!(h.read("readme.txt").as_deref(), Some("v2"));
    assert_eq!(h.read("sub/new.txt").as_deref(), Some("new"));
    assert!(h.repo.journal().is_empty(), "{:?}", h.repo.journal());
    assert_eq!(h.token().await, Some(h.repo.latest_sequence().to_string()));
}

#[tokio::test]
async fn test_remote_deletion_is_applied() {
    let h = common::setup();
    h.repo.put_file("/docs/readme.txt", b"hello").unwrap();
    h.repo.put_file("/docs/keep.txt", b"keep").unwrap();
    let changelog = h.changelog();
    changelog.reconcile().await.unwrap();

    h.repo.remove("/docs/readme.txt").unwrap();
    let report = changelog.reconcile().await.unwrap();

    assert!(report.success());
    assert!(!h.exists("readme.txt"));
    assert!(h.exists("keep.txt"));
    assert!(h.record("readme.txt").await.is_none());
}

#[tokio::test]
async fn test_remote_rename_is_followed_without_download() {
    let h = common::setup();
    h.repo.put_file("/docs/a.txt", b"content").unwrap();
    let changelog = h.changelog();
    changelog.reconcile().await.unwrap();
    let id = h.record("a.txt").await.unwrap().remote_id().cloned();

    h.repo.rename_at("/docs/a.txt", "b.txt").unwrap();
    h.repo.clear_journal();
    let report = changelog.reconcile().await.unwrap();

    assert!(report.success());
    assert_eq!(report.moves, 1);
    assert!(!h.exists("a.txt"));
    assert_eq!(h.read("b.txt").as_deref(), Some("content"));
    assert_eq!(h.repo.downloads(), 0);
    assert!(h.record("a.txt").await.is_none());
    assert_eq!(h.record("b.txt").await.unwrap().remote_id().cloned(), id);
}

#[tokio::test]
async fn test_remote_move_is_followed() {
    let h = common::setup();
    h.repo.put_file("/docs/a.txt", b"content").unwrap();
    h.repo.put_folder("/docs/archive").unwrap();
    let changelog = h.changelog();
    changelog.reconcile().await.unwrap();

    h.repo.move_to("/docs/a.txt", "/docs/archive").unwrap();
    h.repo.clear_journal();
    let report = changelog.reconcile().await.unwrap();

    assert!(report.success());
    assert!(!h.exists("a.txt"));
    assert_eq!(h.read("archive/a.txt").as_deref(), Some("content"));
    assert_eq!(h.repo.downloads(), 0);
}

#[tokio::test]
async fn test_rename_of_locally_edited_file_keeps_edit() {
    let h = common::setup();
    h.repo.put_file("/docs/a.txt", b"content").unwrap();
    let changelog = h.changelog();
    changelog.reconcile().await.unwrap();

    h.write("a.txt", "edited locally");
    h.repo.rename_at("/docs/a.txt", "b.txt").unwrap();
    let report = changelog.reconcile().await.unwrap();

    assert!(report.success());
    assert_eq!(h.read("b.txt").as_deref(), Some("content"));
    // Not mirrored: the edited copy stays and is treated as a new item.
    assert_eq!(h.read("a.txt").as_deref(), Some("edited locally"));
    assert_eq!(h.repo.content_at("/docs/a.txt"), Some(b"edited locally".to_vec()));
}

#[tokio::test]
async fn test_feed_is_paged() {
    let h = common::setup_with(InMemoryRepository::new(), |s| s.change_batch_size = 1);
    let changelog = h.changelog();
    changelog.reconcile().await.unwrap();

    for name in ["one", "two", "three"] {
        h.repo
            .put_file(&format!("/docs/{name}.txt"), name.as_bytes())
            .unwrap();
    }
    let report = changelog.reconcile().await.unwrap();

    assert!(report.success());
    assert_eq!(report.downloads, 3);
    assert_eq!(h.read("two.txt").as_deref(), Some("two"));
    assert_eq!(h.token().await, Some(h.repo.latest_sequence().to_string()));
}

#[tokio::test]
async fn test_changes_outside_scope_are_ignored() {
    let h = common::setup();
    let changelog = h.changelog();
    changelog.reconcile().await.unwrap();

    h.repo.put_file("/elsewhere/x.txt", b"x").unwrap();
    let report = changelog.reconcile().await.unwrap();

    assert!(report.success());
    assert!(h.local_paths().is_empty());
    assert_eq!(h.token().await, Some(h.repo.latest_sequence().to_string()));
}

#[tokio::test]
async fn test_failed_page_keeps_token() {
    let h = common::setup();
    let changelog = h.changelog();
    changelog.reconcile().await.unwrap();
    let committed = h.token().await;

    h.repo.put_file("/docs/readme.txt", b"hello").unwrap();
    h.repo.inject_fault(
        RemoteOp::GetContent,
        Some("/docs/readme.txt"),
        RemoteError::ConnectionLost("reset".into()),
        Some(1),
    );
    let report = changelog.reconcile().await.unwrap();

    assert!(!report.success());
    assert_eq!(h.token().await, committed);
    assert!(!h.exists("readme.txt"));

    // The same window is examined again and now applies.
    let report = changelog.reconcile().await.unwrap();
    assert!(report.success());
    assert_eq!(h.read("readme.txt").as_deref(), Some("hello"));
    assert_eq!(h.token().await, Some(h.repo.latest_sequence().to_string()));
}

#[tokio::test]
async fn test_failed_bootstrap_crawl_stores_no_token() {
    let h = common::setup();
    h.repo.put_file("/docs/readme.txt", b"hello").unwrap();
    h.repo.inject_fault(
        RemoteOp::GetContent,
        None,
        RemoteError::ConnectionLost("reset".into()),
        Some(1),
    );

    let report = h.changelog().reconcile().await.unwrap();

    assert!(!report.success());
    assert!(h.token().await.is_none());
}

#[tokio::test]
async fn test_truncated_feed_fails_without_moving_token() {
    let h = common::setup();
    let changelog = h.changelog();
    changelog.reconcile().await.unwrap();
    let committed = h.token().await;

    h.repo.put_file("/docs/readme.txt", b"hello").unwrap();
    h.repo.truncate_change_log();
    let report = changelog.reconcile().await.unwrap();

    assert!(!report.success());
    assert_eq!(h.token().await, committed);
}

#[tokio::test]
async fn test_without_change_feed_reconcile_crawls() {
    let repo = InMemoryRepository::new().with_capabilities(RepositoryCapabilities {
        supports_change_log: false,
        max_change_items: None,
    });
    let h = common::setup_with(repo, |_| {});
    h.repo.put_file("/docs/readme.txt", b"hello").unwrap();

    let report = h.changelog().reconcile().await.unwrap();

    assert!(report.success());
    assert_eq!(h.read("readme.txt").as_deref(), Some("hello"));
    assert!(h.token().await.is_none());
}
