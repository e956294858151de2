//! Per-item, per-operation retry bookkeeping
//!
//! Counters live in the state store. A failed transient operation bumps
//! its counter; once the counter reaches the limit the operation is
//! skipped (and logged) on every later pass until something resets it.
//! A successful operation resets its counter to zero.

use tracing::{debug, warn};

use docsync_core::{
    domain::{newtypes::SyncPath, sync_item::OperationKind},
    ports::IStateStore,
};

use crate::SyncError;

#[derive(Debug, Clone, Copy)]
pub struct RetryTracker {
    max_retries: u32,
}

impl RetryTracker {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether `kind` may still be attempted for `path`
    pub async fn permits(
        &self,
        state: &dyn IStateStore,
        path: &SyncPath,
        kind: OperationKind,
    ) -> Result<bool, SyncError> {
        let attempts = state
            .get_retry_counter(path, kind)
            .await
            .map_err(SyncError::StateStore)?;
        if attempts >= self.max_retries {
            warn!(
                path = %path,
                operation = kind.as_str(),
                attempts,
                "Retry limit reached, skipping operation"
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// Counts a failed attempt and returns the new count
    pub async fn record_failure(
        &self,
        state: &dyn IStateStore,
        path: &SyncPath,
        kind: OperationKind,
    ) -> Result<u32, SyncError> {
        let attempts = state
            .get_retry_counter(path, kind)
            .await
            .map_err(SyncError::StateStore)?
            .saturating_add(1);
        state
            .set_retry_counter(path, kind, attempts)
            .await
            .map_err(SyncError::StateStore)?;
        debug!(path = %path, operation = kind.as_str(), attempts, "Retry counter incremented");
        Ok(attempts)
    }

    /// Clears the counter after a successful attempt
    pub async fn record_success(
        &self,
        state: &dyn IStateStore,
        path: &SyncPath,
        kind: OperationKind,
    ) -> Result<(), SyncError> {
        let attempts = state
            .get_retry_counter(path, kind)
            .await
            .map_err(SyncError::StateStore)?;
        if attempts > 0 {
            state
                .set_retry_counter(path, kind, 0)
                .await
                .map_err(SyncError::StateStore)?;
        }
        Ok(())
    }
}
