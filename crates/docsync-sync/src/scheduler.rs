//! Sync scheduler - turns timers and local activity into passes
//!
//! The [`SyncScheduler`] runs two timers for one orchestrator:
//!
//! - a poll interval that requests a **full** pass on every tick
//! - a debounce deadline, pushed back on every local event, that requests
//!   a **partial** pass once local activity has been quiet long enough
//!
//! ## Flow
//!
//! ```text
//! FileWatcher ──→ CoalescingEventQueue ──notify──→ SyncScheduler ──→ SyncOrchestrator
//!                                                     │
//!                                          interval + debounce deadline
//! ```
//!
//! Passes are awaited inside the loop, so neither timer fires while a pass
//! runs; the poll interval restarts when the pass completes. Shutdown
//! cancels a running pass and waits for it to unwind.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use docsync_core::domain::PassKind;

use crate::orchestrator::SyncOrchestrator;

pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    /// Signalled by the event queue on every accepted local event
    activity: Arc<Notify>,
    poll_interval: Duration,
    debounce: Duration,
}

impl SyncScheduler {
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        activity: Arc<Notify>,
        poll_interval: Duration,
        debounce: Duration,
    ) -> Self {
        info!(
            poll_ms = poll_interval.as_millis() as u64,
            debounce_ms = debounce.as_millis() as u64,
            "Creating sync scheduler"
        );
        Self {
            orchestrator,
            activity,
            poll_interval,
            debounce,
        }
    }

    /// Main loop; returns once `shutdown` is cancelled
    ///
    /// The first poll tick fires immediately, so a pass runs on start-up.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Sync scheduler starting");
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut deadline: Option<Instant> = None;

        loop {
            let target = deadline;
            let settled = async move {
                match target {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = poll.tick() => {
                    self.trigger(PassKind::Full, &shutdown).await;
                    poll.reset();
                }
                _ = self.activity.notified() => {
                    debug!("Local activity, debounce restarted");
                    deadline = Some(Instant::now() + self.debounce);
                }
                _ = settled => {
                    deadline = None;
                    self.trigger(PassKind::Partial, &shutdown).await;
                }
            }
        }

        info!("Sync scheduler stopped");
    }

    async fn trigger(&self, kind: PassKind, shutdown: &CancellationToken) -> bool {
        debug!(kind = %kind, "Requesting pass");
        let pass = self.orchestrator.sync_pass(kind);
        tokio::pin!(pass);
        tokio::select! {
            done = &mut pass => done,
            _ = shutdown.cancelled() => {
                info!("Shutdown requested, cancelling running pass");
                self.orchestrator.cancel_sync();
                pass.await
            }
        }
    }
}
