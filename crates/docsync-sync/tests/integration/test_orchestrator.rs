//! Integration tests for the orchestrator and the scheduler
//!
//! - Status machine, persisted suspension and the event stream
//! - Suspend, resume and cancel of a running pass
//! - Only one pass at a time
//! - Pass selection between crawl and incremental sequences
//! - Timer-driven passes and shutdown

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use docsync_core::domain::{
    ExceptionKind, ExceptionLevel, FsEvent, PassKind, SyncEvent, SyncStatus,
};
use docsync_core::ports::{
    ILocalEventSource, IRemoteRepository, IStateStore, RemoteError, SETTING_SUSPENDED,
};
use docsync_remote::{InMemoryRepository, RemoteOp};

use crate::common::{self, GatedRepository, Harness, REMOTE_ROOT};

fn gated() -> (Harness, Arc<GatedRepository>) {
    let repo = Arc::new(InMemoryRepository::new());
    repo.put_folder(REMOTE_ROOT).unwrap();
    repo.put_file("/docs/a.txt", b"a").unwrap();
    let gate = Arc::new(GatedRepository::new(Arc::clone(&repo)));
    let h = common::build(repo, Arc::clone(&gate) as Arc<dyn IRemoteRepository>, |_| {});
    (h, gate)
}

async fn next_completed(events: &mut broadcast::Receiver<SyncEvent>) -> (PassKind, bool) {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("no pass completed in time")
            .unwrap();
        if let SyncEvent::SyncCompleted { kind, success } = event {
            return (kind, success);
        }
    }
}

// ----------------------------------------------------------------------------
// Status machine
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_sync_requires_initialization() {
    let h = common::setup();
    h.repo.put_file("/docs/readme.txt", b"hello").unwrap();
    let orchestrator = h.orchestrator();

    assert_eq!(orchestrator.status(), SyncStatus::Init);
    assert!(!orchestrator.sync().await);

    orchestrator.initialize().await.unwrap();
    assert_eq!(orchestrator.status(), SyncStatus::Idle);
    assert!(orchestrator.initialize().await.is_err());
}

#[tokio::test]
async fn test_sync_publishes_events_and_returns_to_idle() {
    let h = common::setup();
    h.repo.put_file("/docs/readme.txt", b"hello").unwrap();
    let orchestrator = h.orchestrator();
    orchestrator.initialize().await.unwrap();
    let mut events = orchestrator.subscribe();
    let mut status = orchestrator.watch_status();

    assert!(orchestrator.sync().await);

    assert_eq!(
        events.recv().await.unwrap(),
        SyncEvent::SyncStarted {
            kind: PassKind::Full
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        SyncEvent::SyncCompleted {
            kind: PassKind::Full,
            success: true
        }
    );
    assert_eq!(*status.borrow_and_update(), SyncStatus::Idle);
    assert_eq!(h.read("readme.txt").as_deref(), Some("hello"));
    assert!(h.token().await.is_some());
    assert!(h.queue.is_enabled());
}

#[tokio::test]
async fn test_sync_in_background() {
    let h = common::setup();
    h.repo.put_file("/docs/readme.txt", b"hello").unwrap();
    let orchestrator = h.orchestrator();
    orchestrator.initialize().await.unwrap();

    assert!(orchestrator.sync_in_background().await.unwrap());
    assert!(h.exists("readme.txt"));
}

#[tokio::test]
async fn test_failed_pass_reports_exception_and_forces_crawl() {
    let h = common::setup();
    h.repo.put_file("/docs/readme.txt", b"hello").unwrap();
    h.repo.inject_fault(
        RemoteOp::GetChildren,
        Some(REMOTE_ROOT),
        RemoteError::ConnectionLost("reset".into()),
        Some(1),
    );
    let orchestrator = h.orchestrator();
    orchestrator.initialize().await.unwrap();
    let mut events = orchestrator.subscribe();

    assert!(!orchestrator.sync().await);

    let _started = events.recv().await.unwrap();
    match events.recv().await.unwrap() {
        SyncEvent::SyncException { level, kind, .. } => {
            assert_eq!(level, ExceptionLevel::Warning);
            assert_eq!(kind, ExceptionKind::ConnectionLost);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(orchestrator.status(), SyncStatus::Idle);
    assert!(h.token().await.is_none());

    // A partial request now crawls and recovers.
    assert!(orchestrator.sync_pass(PassKind::Partial).await);
    assert_eq!(h.read("readme.txt").as_deref(), Some("hello"));
    assert!(h.token().await.is_some());
}

// ----------------------------------------------------------------------------
// Suspend, resume, cancel
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_persisted_suspension_survives_restart() {
    let h = common::setup();
    let orchestrator = h.orchestrator();
    orchestrator.initialize().await.unwrap();

    orchestrator.suspend(true).await.unwrap();
    assert_eq!(orchestrator.status(), SyncStatus::IdleSuspended);
    assert!(!orchestrator.sync().await);
    assert_eq!(
        h.state.get_setting(SETTING_SUSPENDED).await.unwrap().as_deref(),
        Some("true")
    );

    let restarted = h.orchestrator();
    restarted.initialize().await.unwrap();
    assert_eq!(restarted.status(), SyncStatus::IdleSuspended);

    restarted.resume().await.unwrap();
    assert_eq!(restarted.status(), SyncStatus::Idle);
    assert_eq!(
        h.state.get_setting(SETTING_SUSPENDED).await.unwrap().as_deref(),
        Some("false")
    );
    assert!(restarted.sync().await);
}

#[tokio::test]
async fn test_suspend_without_persist_is_not_restored() {
    let h = common::setup();
    let orchestrator = h.orchestrator();
    orchestrator.initialize().await.unwrap();
    orchestrator.suspend(false).await.unwrap();

    let restarted = h.orchestrator();
    restarted.initialize().await.unwrap();
    assert_eq!(restarted.status(), SyncStatus::Idle);
}

#[tokio::test]
async fn test_suspend_parks_running_pass_until_resume() {
    let (h, gate) = gated();
    let orchestrator = h.orchestrator();
    orchestrator.initialize().await.unwrap();

    let pass = orchestrator.sync_in_background();
    gate.wait_entered().await;
    assert_eq!(orchestrator.status(), SyncStatus::Syncing);

    orchestrator.suspend(false).await.unwrap();
    assert_eq!(orchestrator.status(), SyncStatus::SyncingSuspended);
    gate.open();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!pass.is_finished());
    assert!(!h.exists("a.txt"));

    orchestrator.resume().await.unwrap();
    assert!(pass.await.unwrap());
    assert_eq!(orchestrator.status(), SyncStatus::Idle);
    assert_eq!(h.read("a.txt").as_deref(), Some("a"));
}

#[tokio::test]
async fn test_cancel_unwinds_pass_without_token() {
    let (h, gate) = gated();
    let orchestrator = h.orchestrator();
    orchestrator.initialize().await.unwrap();
    let mut events = orchestrator.subscribe();

    let pass = orchestrator.sync_in_background();
    gate.wait_entered().await;
    orchestrator.cancel_sync();
    gate.open();

    assert!(!pass.await.unwrap());
    assert_eq!(orchestrator.status(), SyncStatus::Idle);
    assert!(!h.exists("a.txt"));
    assert!(h.token().await.is_none());
    assert_eq!(next_completed(&mut events).await, (PassKind::Full, false));

    // The next pass starts with a fresh cancellation state.
    assert!(orchestrator.sync().await);
    assert!(h.exists("a.txt"));
}

#[tokio::test]
async fn test_cancel_wakes_suspended_pass() {
    let (h, gate) = gated();
    let orchestrator = h.orchestrator();
    orchestrator.initialize().await.unwrap();

    let pass = orchestrator.sync_in_background();
    gate.wait_entered().await;
    orchestrator.suspend(false).await.unwrap();
    gate.open();
    orchestrator.cancel_sync();

    assert!(!pass.await.unwrap());
    assert_eq!(orchestrator.status(), SyncStatus::IdleSuspended);
    assert!(!h.exists("a.txt"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_right_after_start_stops_the_pass() {
    let (h, gate) = gated();
    let orchestrator = h.orchestrator();
    orchestrator.initialize().await.unwrap();
    let mut status = orchestrator.watch_status();
    let canceller = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            status
                .wait_for(|s| *s == SyncStatus::Syncing)
                .await
                .unwrap();
            orchestrator.cancel_sync();
        })
    };

    let pass = orchestrator.sync_in_background();
    canceller.await.unwrap();
    gate.open();

    assert!(!pass.await.unwrap());
    assert!(!h.exists("a.txt"));
    assert!(h.token().await.is_none());
}

#[tokio::test]
async fn test_only_one_pass_runs_at_a_time() {
    let (h, gate) = gated();
    let orchestrator = h.orchestrator();
    orchestrator.initialize().await.unwrap();

    let first = orchestrator.sync_in_background();
    gate.wait_entered().await;

    assert!(!orchestrator.sync().await);
    assert!(!orchestrator.sync_pass(PassKind::Partial).await);

    gate.open();
    assert!(first.await.unwrap());
    assert_eq!(h.read("a.txt").as_deref(), Some("a"));
}

// ----------------------------------------------------------------------------
// Pass selection
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_full_request_between_crawls_applies_local_events() {
    let h = common::setup();
    h.repo.put_file("/docs/a.txt", b"a").unwrap();
    let orchestrator = h.orchestrator();
    orchestrator.initialize().await.unwrap();
    assert!(orchestrator.sync().await);

    std::fs::rename(h.path("a.txt"), h.path("b.txt")).unwrap();
    h.queue.push(FsEvent::renamed(h.path("a.txt"), h.path("b.txt")));
    h.repo.clear_journal();
    assert!(orchestrator.sync().await);

    let journal = h.repo.journal();
    assert_eq!(journal.len(), 1, "{journal:?}");
    assert!(journal[0].starts_with("update_properties"));
}

#[tokio::test]
async fn test_due_crawl_supersedes_local_events() {
    let h = common::setup_with(InMemoryRepository::new(), |s| {
        s.full_crawl_interval = Duration::ZERO;
    });
    h.repo.put_file("/docs/a.txt", b"a").unwrap();
    let orchestrator = h.orchestrator();
    orchestrator.initialize().await.unwrap();
    assert!(orchestrator.sync().await);

    std::fs::rename(h.path("a.txt"), h.path("b.txt")).unwrap();
    h.queue.push(FsEvent::renamed(h.path("a.txt"), h.path("b.txt")));
    h.repo.clear_journal();
    assert!(orchestrator.sync().await);

    // The crawl sees a deletion and a new file.
    let journal = h.repo.journal();
    assert!(journal.iter().any(|c| c.starts_with("delete_all_versions")));
    assert!(journal.iter().any(|c| c.starts_with("create_document")));
    assert_eq!(h.queue.pending_count(), 0);
    assert_eq!(h.local_paths(), h.remote_paths());
}

#[tokio::test]
async fn test_partial_request_applies_events_then_change_feed() {
    let h = common::setup();
    let orchestrator = h.orchestrator();
    orchestrator.initialize().await.unwrap();
    assert!(orchestrator.sync().await);

    h.write("local.txt", "l");
    h.queue.push(FsEvent::created(h.path("local.txt")));
    h.repo.put_file("/docs/remote.txt", b"r").unwrap();
    assert!(orchestrator.sync_pass(PassKind::Partial).await);

    assert!(h.repo.exists("/docs/local.txt"));
    assert_eq!(h.read("remote.txt").as_deref(), Some("r"));
    assert_eq!(h.token().await, Some(h.repo.latest_sequence().to_string()));
}

#[tokio::test]
async fn test_resume_forces_crawl() {
    let h = common::setup();
    h.repo.put_file("/docs/a.txt", b"a").unwrap();
    let orchestrator = h.orchestrator();
    orchestrator.initialize().await.unwrap();
    assert!(orchestrator.sync().await);

    orchestrator.suspend(false).await.unwrap();
    std::fs::rename(h.path("a.txt"), h.path("b.txt")).unwrap();
    h.queue.push(FsEvent::renamed(h.path("a.txt"), h.path("b.txt")));
    orchestrator.resume().await.unwrap();
    h.repo.clear_journal();
    assert!(orchestrator.sync().await);

    // Crawled: the event was superseded, so no rename call was made.
    let journal = h.repo.journal();
    assert!(!journal.iter().any(|c| c.starts_with("update_properties")));
    assert_eq!(h.local_paths(), h.remote_paths());
}

// ----------------------------------------------------------------------------
// Scheduler
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_scheduler_runs_initial_and_debounced_passes() {
    let h = common::setup_with(InMemoryRepository::new(), |s| {
        s.poll_interval = Duration::from_secs(3600);
        s.debounce_delay = Duration::from_millis(50);
    });
    h.repo.put_file("/docs/readme.txt", b"hello").unwrap();
    let orchestrator = h.orchestrator();
    orchestrator.initialize().await.unwrap();
    let mut events = orchestrator.subscribe();
    let shutdown = CancellationToken::new();
    let runner = tokio::spawn(
        Arc::clone(&orchestrator).run(h.queue.activity(), shutdown.clone()),
    );

    assert_eq!(next_completed(&mut events).await, (PassKind::Full, true));
    assert!(h.exists("readme.txt"));

    h.write("new.txt", "new");
    h.queue.push(FsEvent::created(h.path("new.txt")));
    assert_eq!(next_completed(&mut events).await, (PassKind::Partial, true));
    assert!(h.repo.exists("/docs/new.txt"));

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("scheduler did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_cancels_running_pass() {
    let (h, gate) = gated();
    let orchestrator = h.orchestrator();
    orchestrator.initialize().await.unwrap();
    let mut events = orchestrator.subscribe();
    let shutdown = CancellationToken::new();
    let runner = tokio::spawn(
        Arc::clone(&orchestrator).run(h.queue.activity(), shutdown.clone()),
    );

    gate.wait_entered().await;
    shutdown.cancel();
    gate.open();

    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("scheduler did not stop")
        .unwrap();
    assert_eq!(next_completed(&mut events).await, (PassKind::Full, false));
    assert_eq!(orchestrator.status(), SyncStatus::Idle);
}
