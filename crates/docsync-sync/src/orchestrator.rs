//! Sync orchestrator - status machine and pass selection
//!
//! The [`SyncOrchestrator`] owns the three reconcilers of one synchronized
//! folder and decides which of them a pass runs:
//!
//! - **Full** request: a crawl when one is due (first pass, forced, the
//!   forced-crawl interval elapsed, or no change feed), otherwise the same
//!   sequence as a partial request.
//! - **Partial** request: watcher events, then the change feed (or a crawl
//!   when forced or when the repository has no change feed).
//!
//! ## Design Decisions
//!
//! - Only one pass runs at a time. A trigger that arrives while a pass is
//!   running returns `false` at once instead of queueing.
//! - Any failed pass forces the next one to be a crawl; the change token
//!   is left where the last fully applied page put it.
//! - The local event source is disabled while a pass runs, so the pass
//!   does not observe its own writes.
//! - Progress is published as [`SyncEvent`]s on a broadcast channel and
//!   the status on a watch channel; both are optional to consume.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use docsync_core::{
    domain::{ExceptionKind, ExceptionLevel, PassKind, SyncEvent, SyncStatus},
    ports::{Notification, SETTING_SUSPENDED},
};

use crate::{
    actions::{exception_kind, ItemActions},
    changelog::ChangeLogReconciler,
    context::SyncContext,
    control::SyncControl,
    crawl::CrawlReconciler,
    report::PassReport,
    scheduler::SyncScheduler,
    watcher_sync::WatcherReconciler,
    SyncError,
};

/// Capacity of the event broadcast channel
const EVENT_CAPACITY: usize = 64;

/// Drives the reconciliation of one synchronized folder
pub struct SyncOrchestrator {
    ctx: Arc<SyncContext>,
    control: Arc<SyncControl>,
    changelog: ChangeLogReconciler,
    watcher: WatcherReconciler,
    pass_lock: tokio::sync::Mutex<()>,
    status: watch::Sender<SyncStatus>,
    publisher: broadcast::Sender<SyncEvent>,
    force_full: AtomicBool,
    first_pass_done: AtomicBool,
    last_crawl: Mutex<Option<Instant>>,
}

impl SyncOrchestrator {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        let control = Arc::new(SyncControl::new());
        let actions = Arc::new(ItemActions::new(Arc::clone(&ctx), Arc::clone(&control)));
        let crawl = Arc::new(CrawlReconciler::new(Arc::clone(&actions)));
        let changelog = ChangeLogReconciler::new(Arc::clone(&actions), crawl);
        let watcher = WatcherReconciler::new(actions);
        let (status, _) = watch::channel(SyncStatus::Init);
        let (publisher, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            ctx,
            control,
            changelog,
            watcher,
            pass_lock: tokio::sync::Mutex::new(()),
            status,
            publisher,
            force_full: AtomicBool::new(false),
            first_pass_done: AtomicBool::new(false),
            last_crawl: Mutex::new(None),
        }
    }

    /// `Init -> Idle`, restoring a persisted suspension
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<(), SyncError> {
        let mut result = Ok(());
        self.status.send_if_modified(|status| match status.configured() {
            Ok(next) => {
                *status = next;
                true
            }
            Err(e) => {
                result = Err(e);
                false
            }
        });
        result?;

        let persisted = self
            .ctx
            .state
            .get_setting(SETTING_SUSPENDED)
            .await
            .map_err(SyncError::StateStore)?;
        if persisted.as_deref() == Some("true") {
            info!("Suspension persisted by a previous run");
            self.suspend(false).await?;
        }
        info!(
            local_root = %self.ctx.settings.local_root,
            remote_root = %self.ctx.settings.remote_root,
            status = %self.status(),
            "Orchestrator initialized"
        );
        Ok(())
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.publisher.subscribe()
    }

    pub fn context(&self) -> &Arc<SyncContext> {
        &self.ctx
    }

    /// Runs a full pass; `false` if it failed or could not start
    pub async fn sync(&self) -> bool {
        self.sync_pass(PassKind::Full).await
    }

    pub fn sync_in_background(self: &Arc<Self>) -> JoinHandle<bool> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.sync().await })
    }

    /// Runs one pass of the given kind
    ///
    /// Returns `false` without doing anything when another pass is running
    /// or the orchestrator is not idle (uninitialized or suspended).
    #[instrument(skip(self, kind), fields(kind = %kind))]
    pub async fn sync_pass(&self, kind: PassKind) -> bool {
        let Ok(_guard) = self.pass_lock.try_lock() else {
            debug!("A pass is already running");
            return false;
        };
        // The token is in place before `Syncing` is visible to cancel_sync.
        self.control.begin_pass();
        if !self.try_start() {
            debug!(status = %self.status(), "Not idle, pass not started");
            return false;
        }

        self.ctx.events.set_enabled(false);
        self.publish(SyncEvent::SyncStarted { kind });
        info!("Sync pass started");

        let outcome = self.run_pass(kind).await;
        self.ctx.events.set_enabled(true);

        let success = match outcome {
            Ok(report) if report.success() => {
                info!(
                    changes = report.changes(),
                    skipped = report.skipped,
                    "Sync pass completed"
                );
                true
            }
            Ok(report) => {
                self.force_full.store(true, Ordering::SeqCst);
                let kind = report.failure_kind.unwrap_or(ExceptionKind::Unexpected);
                warn!(errors = ?report.errors, "Sync pass incomplete, next pass crawls");
                self.publish(SyncEvent::SyncException {
                    level: ExceptionLevel::Warning,
                    kind,
                    message: report.errors.first().cloned().unwrap_or_default(),
                });
                false
            }
            Err(SyncError::Cancelled) => {
                self.force_full.store(true, Ordering::SeqCst);
                info!("Sync pass cancelled");
                false
            }
            Err(e) => {
                self.force_full.store(true, Ordering::SeqCst);
                error!(error = %e, "Sync pass failed");
                let notification = Notification::error("Synchronization failed", e.to_string());
                if let Err(err) = self.ctx.notifier.notify(&notification).await {
                    warn!(error = %err, "Failed to deliver notification");
                }
                self.publish(SyncEvent::SyncException {
                    level: ExceptionLevel::Error,
                    kind: error_kind(&e),
                    message: e.to_string(),
                });
                false
            }
        };

        self.status.send_modify(|status| {
            if let Ok(next) = status.finish_pass() {
                *status = next;
            }
        });
        self.publish(SyncEvent::SyncCompleted { kind, success });
        success
    }

    /// `Idle -> Idle_Suspended` or `Syncing -> Syncing_Suspended`
    ///
    /// A running pass parks at its next checkpoint. With `persist`, the
    /// next [`initialize`](Self::initialize) starts suspended as well.
    #[instrument(skip(self))]
    pub async fn suspend(&self, persist: bool) -> Result<(), SyncError> {
        self.transition(SyncStatus::suspend)?;
        self.control.suspend();
        if persist {
            self.ctx
                .state
                .set_setting(SETTING_SUSPENDED, "true")
                .await
                .map_err(SyncError::StateStore)?;
        }
        info!(status = %self.status(), persist, "Synchronization suspended");
        Ok(())
    }

    /// Reverses [`suspend`](Self::suspend); the next pass crawls
    #[instrument(skip(self))]
    pub async fn resume(&self) -> Result<(), SyncError> {
        self.transition(SyncStatus::resume)?;
        self.force_full.store(true, Ordering::SeqCst);
        self.control.resume();
        self.ctx
            .state
            .set_setting(SETTING_SUSPENDED, "false")
            .await
            .map_err(SyncError::StateStore)?;
        info!(status = %self.status(), "Synchronization resumed");
        Ok(())
    }

    /// Cancels the running pass at its next checkpoint
    pub fn cancel_sync(&self) {
        if self.status().is_syncing() {
            self.control.cancel();
        }
    }

    /// Drives the poll and debounce timers until `shutdown` fires
    pub async fn run(self: Arc<Self>, activity: Arc<Notify>, shutdown: CancellationToken) {
        let poll_interval = self.ctx.settings.poll_interval;
        let debounce = self.ctx.settings.debounce_delay;
        SyncScheduler::new(self, activity, poll_interval, debounce)
            .run(shutdown)
            .await;
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn try_start(&self) -> bool {
        self.status.send_if_modified(|status| match status.start_pass() {
            Ok(next) => {
                *status = next;
                true
            }
            Err(_) => false,
        })
    }

    fn transition(
        &self,
        step: fn(SyncStatus) -> Result<SyncStatus, docsync_core::domain::DomainError>,
    ) -> Result<(), SyncError> {
        let mut result = Ok(());
        self.status.send_if_modified(|status| match step(*status) {
            Ok(next) => {
                let changed = *status != next;
                *status = next;
                changed
            }
            Err(e) => {
                result = Err(e);
                false
            }
        });
        Ok(result?)
    }

    fn publish(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.publisher.send(event);
    }

    fn crawl_interval_elapsed(&self) -> bool {
        let interval = self.ctx.settings.full_crawl_interval;
        self.last_crawl
            .lock()
            .map(|last| last.map_or(true, |at| at.elapsed() >= interval))
            .unwrap_or(true)
    }

    async fn run_pass(&self, kind: PassKind) -> Result<PassReport, SyncError> {
        let supports_feed = self.ctx.remote.capabilities().supports_change_log;
        let forced = self.force_full.load(Ordering::SeqCst);
        let first = !self.first_pass_done.load(Ordering::SeqCst);
        let crawl_due = first || forced || !supports_feed || self.crawl_interval_elapsed();

        let (report, crawled) = if kind == PassKind::Full && crawl_due {
            self.force_full.store(false, Ordering::SeqCst);
            let discarded = self.ctx.events.drain();
            debug!(
                discarded = discarded.len(),
                first,
                forced,
                "Crawl due, local events superseded"
            );
            (self.changelog.crawl_and_adopt_token().await?, true)
        } else {
            let mut report = self.watcher.reconcile().await?;
            let crawl = forced || !supports_feed;
            let remote = if crawl {
                self.force_full.store(false, Ordering::SeqCst);
                self.changelog.crawl_and_adopt_token().await?
            } else {
                self.changelog.reconcile().await?
            };
            report.merge(remote);
            (report, crawl)
        };

        self.first_pass_done.store(true, Ordering::SeqCst);
        if crawled && report.success() {
            if let Ok(mut last) = self.last_crawl.lock() {
                *last = Some(Instant::now());
            }
        }
        Ok(report)
    }
}

/// Category reported for a pass that ended in an error
fn error_kind(err: &SyncError) -> ExceptionKind {
    match err {
        SyncError::Remote(e) => exception_kind(e),
        SyncError::StateStore(_) => ExceptionKind::StateStore,
        SyncError::LocalFs(_) => ExceptionKind::LocalFilesystem,
        _ => ExceptionKind::Unexpected,
    }
}
