//! State store port (driven/secondary port)
//!
//! This module defines the persistence interface for per-item sync records,
//! per-item retry counters, the change-feed token, and a small key/value
//! settings table for one synchronized folder.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific.
//! - Records are keyed by local path; lookups by remote path and remote id
//!   are the only other query shapes required.
//! - Only one pass runs at a time per folder, so writes are last-writer-wins.
//! - Retry counters are stored apart from item records so that items which
//!   were never transferred (a failing first upload) can still be counted.

use chrono::{DateTime, Utc};

use crate::domain::newtypes::{ChangeToken, FileHash, RemoteId, RemotePath, SyncPath};
use crate::domain::sync_item::{OperationKind, SyncItem};

/// Settings key under which `Suspend(persist = true)` is recorded
pub const SETTING_SUSPENDED: &str = "suspended";

/// Port trait for sync state persistence
///
/// ## Implementation Notes
///
/// - `save_item` is an upsert keyed by `local_path`. It does not touch retry
///   counters; `get_item*` fill the returned item's counters from the
///   counter table.
/// - `remove_item` and `move_item` apply to every record at or below the
///   given path, so folders carry their subtree along.
/// - The `*_checksum` and `*_remote_last_modified` accessors operate on an
///   existing record and are no-ops when the record is absent.
#[async_trait::async_trait]
pub trait IStateStore: Send + Sync {
    // --- Items ---

    /// Inserts or replaces a record
    async fn save_item(&self, item: &SyncItem) -> anyhow::Result<()>;

    /// Looks up a record by local path
    async fn get_item(&self, local_path: &SyncPath) -> anyhow::Result<Option<SyncItem>>;

    /// Looks up a record by repository path
    async fn get_item_by_remote_path(
        &self,
        remote_path: &RemotePath,
    ) -> anyhow::Result<Option<SyncItem>>;

    /// Looks up a record by repository id
    async fn get_item_by_remote_id(&self, remote_id: &RemoteId)
        -> anyhow::Result<Option<SyncItem>>;

    /// Removes the record at `local_path` and every record below it
    ///
    /// Returns the number of records removed.
    async fn remove_item(&self, local_path: &SyncPath) -> anyhow::Result<u64>;

    /// Re-keys the record at `from` (and its subtree) to the new paths
    async fn move_item(
        &self,
        from: &SyncPath,
        to_local: &SyncPath,
        to_remote: &RemotePath,
    ) -> anyhow::Result<()>;

    /// Lists every record, ordered by local path
    async fn list_items(&self) -> anyhow::Result<Vec<SyncItem>>;

    /// Returns true if a record exists at `local_path`
    async fn contains(&self, local_path: &SyncPath) -> anyhow::Result<bool> {
        Ok(self.get_item(local_path).await?.is_some())
    }

    // --- Per-item fields ---

    /// Recorded checksum of a file
    async fn get_checksum(&self, local_path: &SyncPath) -> anyhow::Result<Option<FileHash>> {
        Ok(self
            .get_item(local_path)
            .await?
            .and_then(|item| item.local_checksum().cloned()))
    }

    /// Updates the recorded checksum of an existing record
    async fn set_checksum(&self, local_path: &SyncPath, hash: &FileHash) -> anyhow::Result<()> {
        if let Some(mut item) = self.get_item(local_path).await? {
            item.set_checksum(hash.clone());
            self.save_item(&item).await?;
        }
        Ok(())
    }

    /// Recorded repository modification time
    async fn get_remote_last_modified(
        &self,
        local_path: &SyncPath,
    ) -> anyhow::Result<Option<DateTime<Utc>>> {
        Ok(self
            .get_item(local_path)
            .await?
            .and_then(|item| item.remote_last_modified()))
    }

    /// Updates the recorded repository modification time of an existing record
    async fn set_remote_last_modified(
        &self,
        local_path: &SyncPath,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if let Some(mut item) = self.get_item(local_path).await? {
            item.set_remote_last_modified(at);
            self.save_item(&item).await?;
        }
        Ok(())
    }

    // --- Retry counters ---

    /// Failed attempts for `kind` on `local_path` (0 when never recorded)
    async fn get_retry_counter(
        &self,
        local_path: &SyncPath,
        kind: OperationKind,
    ) -> anyhow::Result<u32>;

    /// Sets the failed-attempt counter; 0 clears it
    async fn set_retry_counter(
        &self,
        local_path: &SyncPath,
        kind: OperationKind,
        value: u32,
    ) -> anyhow::Result<()>;

    // --- Change feed ---

    /// Last fully applied change token
    async fn get_change_token(&self) -> anyhow::Result<Option<ChangeToken>>;

    /// Records a change token after its page was fully applied
    async fn set_change_token(&self, token: &ChangeToken) -> anyhow::Result<()>;

    // --- Settings ---

    /// Reads a folder-level setting
    async fn get_setting(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Writes a folder-level setting
    async fn set_setting(&self, key: &str, value: &str) -> anyhow::Result<()>;
}
