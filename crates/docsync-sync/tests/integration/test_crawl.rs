//! Integration tests for the crawl reconciler
//!
//! - First download of a remote tree
//! - Local and remote deletions in both directions
//! - Conflicting edits keep both versions
//! - A second crawl without changes has no side effects
//! - The retry bound stops repeated attempts

use docsync_core::domain::OperationKind;
use docsync_core::ports::{IStateStore, RemoteError};
use docsync_remote::{InMemoryRepository, RemoteOp};

use crate::common::{self, hash};

#[tokio::test]
async fn test_crawl_downloads_new_remote_file() {
    let h = common::setup();
    let remote = h.repo.put_file("/docs/readme.txt", b"hello").unwrap();

    let report = h.crawl().await;

    assert!(report.success());
    assert_eq!(report.downloads, 1);
    assert_eq!(h.read("readme.txt").as_deref(), Some("hello"));
    let record = h.record("readme.txt").await.expect("record saved");
    assert_eq!(record.remote_id(), Some(&remote.id));
    assert_eq!(record.local_checksum(), Some(&hash("hello")));
    assert_eq!(record.remote_last_modified(), Some(remote.last_modified));
}

#[tokio::test]
async fn test_crawl_downloads_nested_folders() {
    let h = common::setup();
    h.repo.put_file("/docs/a/b/deep.txt", b"deep").unwrap();
    h.repo.put_folder("/docs/empty").unwrap();

    let report = h.crawl().await;

    assert!(report.success());
    assert_eq!(h.read("a/b/deep.txt").as_deref(), Some("deep"));
    assert!(h.path("empty").is_dir());
    assert!(h.record("a").await.unwrap().is_folder());
    assert!(h.record("a/b/deep.txt").await.is_some());
}

#[tokio::test]
async fn test_local_deletion_deletes_remote_document() {
    let h = common::setup();
    h.repo.put_file("/docs/readme.txt", b"hello").unwrap();
    h.crawl().await;

    std::fs::remove_file(h.path("readme.txt")).unwrap();
    let report = h.crawl().await;

    assert!(report.success());
    assert_eq!(report.remote_deletions, 1);
    assert!(!h.repo.exists("/docs/readme.txt"));
    assert!(h.record("readme.txt").await.is_none());
    assert!(h
        .repo
        .journal()
        .contains(&"delete_all_versions /docs/readme.txt".to_string()));
}

#[tokio::test]
async fn test_local_folder_deletion_deletes_remote_tree() {
    let h = common::setup();
    h.repo.put_file("/docs/sub/one.txt", b"1").unwrap();
    h.repo.put_file("/docs/sub/two.txt", b"2").unwrap();
    h.crawl().await;

    std::fs::remove_dir_all(h.path("sub")).unwrap();
    let report = h.crawl().await;

    assert!(report.success());
    assert!(!h.repo.exists("/docs/sub"));
    assert!(h.record("sub").await.is_none());
    assert!(h.record("sub/one.txt").await.is_none());
}

#[tokio::test]
async fn test_local_deletion_restores_file_changed_remotely() {
    let h = common::setup();
    h.repo.put_file("/docs/readme.txt", b"v1").unwrap();
    h.crawl().await;

    std::fs::remove_file(h.path("readme.txt")).unwrap();
    h.repo.put_file("/docs/readme.txt", b"v2").unwrap();
    let report = h.crawl().await;

    assert!(report.success());
    assert!(h.repo.exists("/docs/readme.txt"));
    assert_eq!(h.read("readme.txt").as_deref(), Some("v2"));
}

#[tokio::test]
async fn test_remote_deletion_deletes_local_file() {
    let h = common::setup();
    h.repo.put_file("/docs/readme.txt", b"hello").unwrap();
    h.crawl().await;

    h.repo.remove("/docs/readme.txt").unwrap();
    let report = h.crawl().await;

    assert!(report.success());
    assert_eq!(report.local_deletions, 1);
    assert!(!h.exists("readme.txt"));
    assert!(h.record("readme.txt").await.is_none());
}

#[tokio::test]
async fn test_remote_deletion_keeps_local_edits() {
    let h = common::setup();
    h.repo.put_file("/docs/sub/kept.txt", b"v1").unwrap();
    h.repo.put_file("/docs/sub/plain.txt", b"plain").unwrap();
    h.crawl().await;

    h.write("sub/kept.txt", "edited");
    h.repo.remove("/docs/sub").unwrap();
    let report = h.crawl().await;

    assert!(report.success());
    assert!(!h.exists("sub/plain.txt"));
    assert_eq!(h.read("sub/kept.txt").as_deref(), Some("edited"));
    // The surviving edit comes back as a new item.
    assert_eq!(h.repo.content_at("/docs/sub/kept.txt"), Some(b"edited".to_vec()));
    assert!(!h.repo.exists("/docs/sub/plain.txt"));
}

#[tokio::test]
async fn test_new_local_items_are_uploaded() {
    let h = common::setup();
    h.write("notes.md", "# notes");
    h.write("project/src/main.txt", "body");

    let report = h.crawl().await;

    assert!(report.success());
    assert_eq!(report.uploads, 2);
    assert_eq!(h.repo.content_at("/docs/notes.md"), Some(b"# notes".to_vec()));
    assert_eq!(
        h.repo.content_at("/docs/project/src/main.txt"),
        Some(b"body".to_vec())
    );
    let record = h.record("project/src/main.txt").await.unwrap();
    assert_eq!(
        record.remote_id(),
        h.repo.object_at("/docs/project/src/main.txt").map(|o| o.id).as_ref()
    );
}

#[tokio::test]
async fn test_local_edit_is_uploaded() {
    let h = common::setup();
    h.repo.put_file("/docs/readme.txt", b"v1").unwrap();
    h.crawl().await;

    h.write("readme.txt", "v2 local");
    let report = h.crawl().await;

    assert!(report.success());
    assert_eq!(report.uploads, 1);
    assert_eq!(h.repo.content_at("/docs/readme.txt"), Some(b"v2 local".to_vec()));
    assert_eq!(
        h.record("readme.txt").await.unwrap().local_checksum(),
        Some(&hash("v2 local"))
    );
}

#[tokio::test]
async fn test_ignored_names_are_left_alone() {
    let h = common::setup();
    h.write("draft.tmp", "scratch");
    h.write("~$report.docx", "lock");
    h.repo.put_file("/docs/.DS_Store", b"finder").unwrap();

    let report = h.crawl().await;

    assert!(report.success());
    assert!(!h.repo.exists("/docs/draft.tmp"));
    assert!(!h.repo.exists("/docs/~$report.docx"));
    assert!(!h.exists(".DS_Store"));
}

#[tokio::test]
async fn test_invalid_remote_name_is_skipped_not_renamed() {
    let h = common::setup();
    h.repo.put_file("/docs/a:b.txt", b"colon").unwrap();
    h.repo.clear_journal();

    let report = h.crawl().await;

    assert!(report.success());
    assert_eq!(report.skipped, 1);
    assert!(h.local_paths().is_empty(), "{:?}", h.local_paths());
    assert!(h.repo.journal().is_empty(), "{:?}", h.repo.journal());
    assert_eq!(h.repo.content_at("/docs/a:b.txt"), Some(b"colon".to_vec()));
}

#[tokio::test]
async fn test_download_only_mode_never_uploads() {
    let h = common::setup_with(InMemoryRepository::new(), |s| s.bidirectional = false);
    h.repo.put_file("/docs/readme.txt", b"hello").unwrap();
    h.write("local-only.txt", "mine");

    let report = h.crawl().await;
    assert!(report.success());
    assert_eq!(h.read("readme.txt").as_deref(), Some("hello"));
    assert!(!h.repo.exists("/docs/local-only.txt"));

    std::fs::remove_file(h.path("readme.txt")).unwrap();
    h.crawl().await;
    assert!(h.repo.exists("/docs/readme.txt"));
    assert_eq!(h.read("readme.txt").as_deref(), Some("hello"));
}

// ----------------------------------------------------------------------------
// Conflicts
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_conflicting_edits_keep_both_versions() {
    let h = common::setup();
    h.repo.put_file("/docs/readme.txt", b"original").unwrap();
    h.crawl().await;

    h.repo.set_editor("bob");
    h.repo.put_file("/docs/readme.txt", b"remote edit").unwrap();
    h.write("readme.txt", "local edit");
    let report = h.crawl().await;

    assert!(report.success());
    assert_eq!(report.conflicts, 1);
    assert_eq!(h.read("readme.txt").as_deref(), Some("remote edit"));
    assert_eq!(
        h.read("readme (alice-version).txt").as_deref(),
        Some("local edit")
    );
    assert_eq!(h.repo.content_at("/docs/readme.txt"), Some(b"remote edit".to_vec()));
    assert!(h.notifier.categories().contains(&"conflict".to_string()));
    assert!(h.notifier.bodies().iter().any(|b| b.contains("bob")));
}

#[tokio::test]
async fn test_conflict_copy_is_uploaded_on_next_crawl() {
    let h = common::setup();
    h.repo.put_file("/docs/readme.txt", b"original").unwrap();
    h.crawl().await;
    h.repo.put_file("/docs/readme.txt", b"remote edit").unwrap();
    h.write("readme.txt", "local edit");
    h.crawl().await;

    h.crawl().await;

    assert_eq!(
        h.repo.content_at("/docs/readme (alice-version).txt"),
        Some(b"local edit".to_vec())
    );
}

#[tokio::test]
async fn test_identical_edits_are_not_a_conflict() {
    let h = common::setup();
    h.repo.put_file("/docs/readme.txt", b"original").unwrap();
    h.crawl().await;

    h.repo.put_file("/docs/readme.txt", b"same").unwrap();
    h.write("readme.txt", "same");
    let report = h.crawl().await;

    assert!(report.success());
    assert_eq!(report.conflicts, 0);
    assert!(!h.exists("readme (alice-version).txt"));
    h.repo.clear_journal();
    h.crawl().await;
    assert!(h.repo.journal().is_empty());
}

#[tokio::test]
async fn test_unrecorded_file_on_both_sides_is_adopted_when_identical() {
    let h = common::setup();
    h.repo.put_file("/docs/shared.txt", b"same").unwrap();
    h.write("shared.txt", "same");

    let report = h.crawl().await;

    assert!(report.success());
    assert_eq!(report.downloads, 0);
    assert_eq!(report.conflicts, 0);
    assert!(h.record("shared.txt").await.is_some());
}

// ----------------------------------------------------------------------------
// Properties
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_second_crawl_has_no_side_effects() {
    let h = common::setup();
    h.repo.put_file("/docs/readme.txt", b"hello").unwrap();
    h.repo.put_file("/docs/sub/inner.txt", b"inner").unwrap();
    h.write("local.txt", "local");
    h.write("dir/nested.txt", "nested");
    h.crawl().await;

    h.repo.clear_journal();
    let report = h.crawl().await;

    assert!(report.success());
    assert_eq!(report.changes(), 0);
    assert!(h.repo.journal().is_empty(), "{:?}", h.repo.journal());
    assert_eq!(h.repo.downloads(), 0);
}

#[tokio::test]
async fn test_two_crawls_converge_after_edits_on_both_sides() {
    let h = common::setup();
    h.repo.put_file("/docs/a.txt", b"a").unwrap();
    h.repo.put_file("/docs/b.txt", b"b").unwrap();
    h.crawl().await;

    h.repo.put_file("/docs/a.txt", b"a remote").unwrap();
    h.repo.put_file("/docs/new-remote.txt", b"r").unwrap();
    h.write("new-local.txt", "l");
    std::fs::remove_file(h.path("b.txt")).unwrap();

    h.crawl().await;
    h.crawl().await;

    assert_eq!(h.local_paths(), h.remote_paths());
    assert_eq!(h.read("a.txt").as_deref(), Some("a remote"));
    assert!(!h.repo.exists("/docs/b.txt"));
}

#[tokio::test]
async fn test_retry_bound_stops_attempts() {
    let h = common::setup_with(InMemoryRepository::new(), |s| s.max_retries = 2);
    h.repo.put_file("/docs/readme.txt", b"hello").unwrap();
    h.repo.inject_fault(
        RemoteOp::GetContent,
        Some("/docs/readme.txt"),
        RemoteError::ConnectionLost("reset".into()),
        None,
    );
    let path = h.local("readme.txt");

    assert!(!h.crawl().await.success());
    assert!(!h.crawl().await.success());
    assert_eq!(
        h.state.get_retry_counter(&path, OperationKind::Download).await.unwrap(),
        2
    );

    // The bound is reached: skipped, not failed, and not attempted.
    let report = h.crawl().await;
    assert!(report.success());
    assert!(report.skipped >= 1);
    assert_eq!(
        h.state.get_retry_counter(&path, OperationKind::Download).await.unwrap(),
        2
    );
    assert!(!h.exists("readme.txt"));
}

#[tokio::test]
async fn test_success_resets_retry_counter() {
    let h = common::setup();
    h.repo.put_file("/docs/readme.txt", b"hello").unwrap();
    h.repo.inject_fault(
        RemoteOp::GetContent,
        Some("/docs/readme.txt"),
        RemoteError::ConnectionLost("reset".into()),
        Some(1),
    );
    let path = h.local("readme.txt");

    assert!(!h.crawl().await.success());
    assert_eq!(
        h.state.get_retry_counter(&path, OperationKind::Download).await.unwrap(),
        1
    );

    assert!(h.crawl().await.success());
    assert_eq!(
        h.state.get_retry_counter(&path, OperationKind::Download).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_failed_listing_does_not_delete_local_items() {
    let h = common::setup();
    h.repo.put_file("/docs/sub/keep.txt", b"keep").unwrap();
    h.crawl().await;

    h.repo.inject_fault(
        RemoteOp::GetChildren,
        Some("/docs/sub"),
        RemoteError::ConnectionLost("reset".into()),
        Some(1),
    );
    let report = h.crawl().await;

    assert!(!report.success());
    assert!(h.exists("sub/keep.txt"));
    assert!(h.record("sub/keep.txt").await.is_some());
}

#[tokio::test]
async fn test_stale_conflict_copy_triggers_reminder() {
    let h = common::setup_with(InMemoryRepository::new(), |_| {});
    h.write("report (alice-version).txt", "old copy");

    // Default policy reminds after a few passes.
    for _ in 0..5 {
        h.crawl().await;
    }

    assert!(h
        .notifier
        .bodies()
        .iter()
        .any(|b| b.contains("report (alice-version).txt")));
}
