//! Integration tests for local event reconciliation
//!
//! - Renames and moves keep the remote object identity
//! - Creations, edits and deletions are pushed to the repository
//! - Deletions are re-checked before they are propagated
//! - Ignored names and download-only mode

use docsync_core::domain::FsEvent;
use docsync_core::ports::ILocalEventSource;
use docsync_remote::InMemoryRepository;

use crate::common::{self, Harness};

async fn synced(files: &[(&str, &str)]) -> Harness {
    let h = common::setup();
    for (path, content) in files {
        h.repo
            .put_file(&format!("/docs/{path}"), content.as_bytes())
            .unwrap();
    }
    assert!(h.crawl().await.success());
    h.repo.clear_journal();
    h
}

fn rename(h: &Harness, from: &str, to: &str) {
    if let Some(parent) = h.path(to).parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::rename(h.path(from), h.path(to)).unwrap();
    h.queue.push(FsEvent::renamed(h.path(from), h.path(to)));
}

// ----------------------------------------------------------------------------
// Renames and moves
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_rename_in_place_keeps_remote_identity() {
    let h = synced(&[("a.txt", "content")]).await;
    let id = h.record("a.txt").await.unwrap().remote_id().cloned();

    rename(&h, "a.txt", "b.txt");
    let report = h.watcher().reconcile().await.unwrap();

    assert!(report.success());
    assert_eq!(report.moves, 1);
    let journal = h.repo.journal();
    assert_eq!(journal.len(), 1, "{journal:?}");
    assert!(journal[0].starts_with("update_properties"));
    assert!(!h.repo.exists("/docs/a.txt"));
    assert_eq!(h.repo.object_at("/docs/b.txt").map(|o| o.id), id);

    assert!(h.record("a.txt").await.is_none());
    let record = h.record("b.txt").await.unwrap();
    assert_eq!(record.remote_id().cloned(), id);
    assert_eq!(record.remote_path().as_str(), "/docs/b.txt");
}

#[tokio::test]
async fn test_rename_is_stable_for_next_crawl() {
    let h = synced(&[("a.txt", "content")]).await;
    rename(&h, "a.txt", "b.txt");
    h.watcher().reconcile().await.unwrap();

    h.repo.clear_journal();
    let report = h.crawl().await;

    assert!(report.success());
    assert!(h.repo.journal().is_empty(), "{:?}", h.repo.journal());
    assert_eq!(h.repo.downloads(), 0);
}

#[tokio::test]
async fn test_move_between_folders_keeps_remote_identity() {
    let h = synced(&[("inbox/f.txt", "f"), ("archive/keep.txt", "k")]).await;
    let id = h.record("inbox/f.txt").await.unwrap().remote_id().cloned();

    rename(&h, "inbox/f.txt", "archive/f.txt");
    let report = h.watcher().reconcile().await.unwrap();

    assert!(report.success());
    let journal = h.repo.journal();
    assert_eq!(journal.len(), 1, "{journal:?}");
    assert!(journal[0].starts_with("move_object"));
    assert_eq!(h.repo.object_at("/docs/archive/f.txt").map(|o| o.id), id);
    assert_eq!(
        h.record("archive/f.txt").await.unwrap().remote_id().cloned(),
        id
    );
}

#[tokio::test]
async fn test_rename_of_folder_moves_records_below_it() {
    let h = synced(&[("old/one.txt", "1"), ("old/deeper/two.txt", "2")]).await;

    rename(&h, "old", "new");
    let report = h.watcher().reconcile().await.unwrap();

    assert!(report.success());
    assert!(h.repo.exists("/docs/new/deeper/two.txt"));
    assert!(h.record("old/one.txt").await.is_none());
    let record = h.record("new/deeper/two.txt").await.unwrap();
    assert_eq!(record.remote_path().as_str(), "/docs/new/deeper/two.txt");
}

#[tokio::test]
async fn test_rename_and_move_at_once_is_delete_and_create() {
    let h = synced(&[("inbox/f.txt", "f"), ("archive/keep.txt", "k")]).await;

    rename(&h, "inbox/f.txt", "archive/g.txt");
    let report = h.watcher().reconcile().await.unwrap();

    assert!(report.success());
    assert!(!h.repo.exists("/docs/inbox/f.txt"));
    assert_eq!(h.repo.content_at("/docs/archive/g.txt"), Some(b"f".to_vec()));
    let journal = h.repo.journal();
    assert!(journal.iter().any(|c| c.starts_with("delete_all_versions")));
    assert!(journal.iter().any(|c| c.starts_with("create_document")));
}

#[tokio::test]
async fn test_rename_onto_tracked_path_replaces_it() {
    let h = synced(&[("a.txt", "a"), ("b.txt", "b")]).await;

    std::fs::rename(h.path("a.txt"), h.path("b.txt")).unwrap();
    h.queue.push(FsEvent::renamed(h.path("a.txt"), h.path("b.txt")));
    let report = h.watcher().reconcile().await.unwrap();

    assert!(report.success());
    assert!(!h.repo.exists("/docs/a.txt"));
    assert_eq!(h.repo.content_at("/docs/b.txt"), Some(b"a".to_vec()));
}

#[tokio::test]
async fn test_rename_into_ignored_name_deletes_remote() {
    let h = synced(&[("a.txt", "a")]).await;

    rename(&h, "a.txt", "a.txt.tmp");
    let report = h.watcher().reconcile().await.unwrap();

    assert!(report.success());
    assert!(!h.repo.exists("/docs/a.txt"));
    assert!(!h.repo.exists("/docs/a.txt.tmp"));
    assert!(h.record("a.txt").await.is_none());
}

#[tokio::test]
async fn test_rename_from_ignored_name_creates_remote() {
    let h = synced(&[]).await;
    h.write("draft.tmp", "draft");

    rename(&h, "draft.tmp", "final.txt");
    let report = h.watcher().reconcile().await.unwrap();

    assert!(report.success());
    assert_eq!(h.repo.content_at("/docs/final.txt"), Some(b"draft".to_vec()));
    assert!(!h.repo.exists("/docs/draft.tmp"));
}

#[tokio::test]
async fn test_renamed_and_edited_file_uploads_new_content() {
    let h = synced(&[("a.txt", "v1")]).await;

    rename(&h, "a.txt", "b.txt");
    h.write("b.txt", "v2");
    let report = h.watcher().reconcile().await.unwrap();

    assert!(report.success());
    assert_eq!(h.repo.content_at("/docs/b.txt"), Some(b"v2".to_vec()));
    assert!(h
        .repo
        .journal()
        .iter()
        .any(|c| c.starts_with("set_content_stream")));
}

#[tokio::test]
async fn test_rename_of_file_edited_remotely_downloads_remote_content() {
    let h = synced(&[("a.txt", "v1")]).await;
    h.repo.put_file("/docs/a.txt", b"v2-remote").unwrap();

    rename(&h, "a.txt", "b.txt");
    let report = h.watcher().reconcile().await.unwrap();

    assert!(report.success());
    assert_eq!(report.moves, 1);
    assert_eq!(h.read("b.txt").as_deref(), Some("v2-remote"));
    assert_eq!(h.repo.content_at("/docs/b.txt"), Some(b"v2-remote".to_vec()));

    h.repo.clear_journal();
    assert!(h.crawl().await.success());
    assert!(h.repo.journal().is_empty(), "{:?}", h.repo.journal());
    assert_eq!(h.read("b.txt").as_deref(), Some("v2-remote"));
}

#[tokio::test]
async fn test_rename_of_file_edited_on_both_sides_becomes_conflict() {
    let h = synced(&[("a.txt", "v1")]).await;
    h.repo.put_file("/docs/a.txt", b"v2-remote").unwrap();

    rename(&h, "a.txt", "b.txt");
    h.write("b.txt", "v2-local");
    let report = h.watcher().reconcile().await.unwrap();

    assert!(report.success());
    assert_eq!(report.conflicts, 1);
    assert_eq!(h.repo.content_at("/docs/b.txt"), Some(b"v2-remote".to_vec()));
    assert_eq!(h.read("b.txt").as_deref(), Some("v2-remote"));
    assert_eq!(h.read("b (alice-version).txt").as_deref(), Some("v2-local"));
}

// ----------------------------------------------------------------------------
// Creations, edits, deletions
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_created_file_is_uploaded() {
    let h = synced(&[]).await;
    h.write("new.txt", "new");
    h.queue.push(FsEvent::created(h.path("new.txt")));

    let report = h.watcher().reconcile().await.unwrap();

    assert!(report.success());
    assert_eq!(report.uploads, 1);
    assert_eq!(h.repo.content_at("/docs/new.txt"), Some(b"new".to_vec()));
    assert!(h.record("new.txt").await.is_some());
}

#[tokio::test]
async fn test_created_file_in_new_folder_uploads_folder() {
    let h = synced(&[]).await;
    h.write("fresh/dir/file.txt", "x");
    h.queue.push(FsEvent::created(h.path("fresh/dir/file.txt")));

    let report = h.watcher().reconcile().await.unwrap();

    assert!(report.success());
    assert_eq!(h.repo.content_at("/docs/fresh/dir/file.txt"), Some(b"x".to_vec()));
    assert!(h.record("fresh").await.unwrap().is_folder());
}

#[tokio::test]
async fn test_created_folder_is_uploaded_recursively() {
    let h = synced(&[]).await;
    h.write("project/a.txt", "a");
    h.write("project/sub/b.txt", "b");
    h.queue.push(FsEvent::created(h.path("project")));

    let report = h.watcher().reconcile().await.unwrap();

    assert!(report.success());
    assert!(h.repo.exists("/docs/project/a.txt"));
    assert!(h.repo.exists("/docs/project/sub/b.txt"));
}

#[tokio::test]
async fn test_changed_file_content_is_pushed() {
    let h = synced(&[("readme.txt", "v1")]).await;
    h.write("readme.txt", "v2");
    h.queue.push(FsEvent::changed(h.path("readme.txt")));

    let report = h.watcher().reconcile().await.unwrap();

    assert!(report.success());
    assert_eq!(report.uploads, 1);
    assert_eq!(h.repo.content_at("/docs/readme.txt"), Some(b"v2".to_vec()));
    assert_eq!(
        h.repo.journal(),
        vec!["set_content_stream /docs/readme.txt".to_string()]
    );
}

#[tokio::test]
async fn test_unchanged_content_is_not_pushed() {
    let h = synced(&[("readme.txt", "v1")]).await;
    h.queue.push(FsEvent::changed(h.path("readme.txt")));

    let report = h.watcher().reconcile().await.unwrap();

    assert!(report.success());
    assert!(h.repo.journal().is_empty());
}

#[tokio::test]
async fn test_changed_file_edited_remotely_becomes_conflict() {
    let h = synced(&[("readme.txt", "v1")]).await;
    h.repo.put_file("/docs/readme.txt", b"remote").unwrap();
    h.write("readme.txt", "local");
    h.queue.push(FsEvent::changed(h.path("readme.txt")));

    let report = h.watcher().reconcile().await.unwrap();

    assert!(report.success());
    assert_eq!(report.conflicts, 1);
    assert_eq!(h.read("readme.txt").as_deref(), Some("remote"));
    assert_eq!(h.read("readme (alice-version).txt").as_deref(), Some("local"));
}

#[tokio::test]
async fn test_deleted_file_is_deleted_remotely() {
    let h = synced(&[("readme.txt", "v1")]).await;
    std::fs::remove_file(h.path("readme.txt")).unwrap();
    h.queue.push(FsEvent::deleted(h.path("readme.txt")));

    let report = h.watcher().reconcile().await.unwrap();

    assert!(report.success());
    assert_eq!(report.remote_deletions, 1);
    assert!(!h.repo.exists("/docs/readme.txt"));
    assert!(h.record("readme.txt").await.is_none());
}

#[tokio::test]
async fn test_deleted_then_reappeared_file_is_kept() {
    let h = synced(&[("readme.txt", "v1")]).await;
    // Editors that save via a temporary file produce this sequence.
    h.queue.push(FsEvent::deleted(h.path("readme.txt")));

    let report = h.watcher().reconcile().await.unwrap();

    assert!(report.success());
    assert!(h.repo.exists("/docs/readme.txt"));
    assert!(h.repo.journal().is_empty());
    assert!(h.record("readme.txt").await.is_some());
}

#[tokio::test]
async fn test_deleted_file_changed_remotely_is_restored() {
    let h = synced(&[("readme.txt", "v1")]).await;
    h.repo.put_file("/docs/readme.txt", b"v2").unwrap();
    std::fs::remove_file(h.path("readme.txt")).unwrap();
    h.queue.push(FsEvent::deleted(h.path("readme.txt")));

    let report = h.watcher().reconcile().await.unwrap();

    assert!(report.success());
    assert!(h.repo.exists("/docs/readme.txt"));
    assert_eq!(h.read("readme.txt").as_deref(), Some("v2"));
}

#[tokio::test]
async fn test_deleted_folder_deletes_remote_tree() {
    let h = synced(&[("sub/a.txt", "a"), ("sub/b.txt", "b")]).await;
    std::fs::remove_dir_all(h.path("sub")).unwrap();
    h.queue.push(FsEvent::deleted(h.path("sub")));

    let report = h.watcher().reconcile().await.unwrap();

    assert!(report.success());
    assert!(!h.repo.exists("/docs/sub"));
    assert!(h.record("sub/a.txt").await.is_none());
}

#[tokio::test]
async fn test_ignored_names_are_skipped() {
    let h = synced(&[]).await;
    h.write("~$report.docx", "lock");
    h.queue.push(FsEvent::created(h.path("~$report.docx")));

    let report = h.watcher().reconcile().await.unwrap();

    assert!(report.success());
    assert!(h.repo.journal().is_empty());
}

#[tokio::test]
async fn test_events_are_drained() {
    let h = synced(&[]).await;
    h.write("new.txt", "new");
    h.queue.push(FsEvent::created(h.path("new.txt")));

    h.watcher().reconcile().await.unwrap();

    assert_eq!(h.queue.pending_count(), 0);
}

#[tokio::test]
async fn test_download_only_discards_events() {
    let h = common::setup_with(InMemoryRepository::new(), |s| s.bidirectional = false);
    h.write("new.txt", "new");
    h.queue.push(FsEvent::created(h.path("new.txt")));

    let report = h.watcher().reconcile().await.unwrap();

    assert!(report.success());
    assert_eq!(h.queue.pending_count(), 0);
    assert!(!h.repo.exists("/docs/new.txt"));
}
