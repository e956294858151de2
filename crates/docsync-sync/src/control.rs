//! Cooperative suspend and cancel signals
//!
//! Reconcilers call [`SyncControl::checkpoint`] at the top of every folder
//! step and every event application. A suspended pass parks there until
//! it is resumed or cancelled; a cancelled pass gets `SyncError::Cancelled`
//! and unwinds. Nothing is interrupted in the middle of a repository call.

use std::sync::Mutex;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::SyncError;

/// Suspend flag plus the cancellation token of the current pass
#[derive(Debug)]
pub struct SyncControl {
    suspended: watch::Sender<bool>,
    cancel: Mutex<CancellationToken>,
}

impl Default for SyncControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncControl {
    pub fn new() -> Self {
        let (suspended, _) = watch::channel(false);
        Self {
            suspended,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Issues a fresh cancellation token for a new pass
    pub fn begin_pass(&self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Ok(mut current) = self.cancel.lock() {
            *current = token.clone();
        }
        token
    }

    /// Token of the current (or last) pass
    pub fn token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .map(|t| t.clone())
            .unwrap_or_else(|_| CancellationToken::new())
    }

    /// Requests cancellation of the running pass
    pub fn cancel(&self) {
        info!("Cancellation requested");
        self.token().cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token().is_cancelled()
    }

    pub fn suspend(&self) {
        self.suspended.send_replace(true);
    }

    pub fn resume(&self) {
        self.suspended.send_replace(false);
    }

    pub fn is_suspended(&self) -> bool {
        *self.suspended.borrow()
    }

    /// Blocks while suspended; fails once the pass is cancelled
    pub async fn checkpoint(&self) -> Result<(), SyncError> {
        let token = self.token();
        if token.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let mut rx = self.suspended.subscribe();
        let mut parked = false;
        loop {
            if !*rx.borrow_and_update() {
                if parked {
                    debug!("Resumed at checkpoint");
                }
                return Ok(());
            }
            if !parked {
                debug!("Suspended at checkpoint");
                parked = true;
            }
            tokio::select! {
                _ = token.cancelled() => return Err(SyncError::Cancelled),
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Sleeps for `duration` unless the pass is cancelled first
    pub async fn sleep(&self, duration: std::time::Duration) -> Result<(), SyncError> {
        let token = self.token();
        tokio::select! {
            _ = token.cancelled() => Err(SyncError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
