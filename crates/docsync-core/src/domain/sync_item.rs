//! SyncItem domain entity
//!
//! A SyncItem is the unit of reconciliation: one file or one folder,
//! addressable both by its local path and by its repository path.
//!
//! ## Lifecycle
//!
//! ```text
//!   (absent) ──── transfer either way ────► recorded ◄──┐
//!                                              │         │ transfer / metadata change
//!                                              ├─────────┘
//!                                              │
//!                          deleted on both sides
//!                                              ▼
//!                                          (absent)
//! ```
//!
//! Absence from the state store means "never synchronized". That is the
//! signal used to tell a *new* item from a *deleted* one when it is missing
//! on one side. No tombstones are kept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::DomainError;
use super::newtypes::{FileHash, RemoteId, RemotePath, SyncPath};

// ============================================================================
// OperationKind
// ============================================================================

/// Kind of operation a retry counter is kept for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Local content sent to the repository (create or update)
    Upload,
    /// Repository content written locally
    Download,
    /// Deletion on either side
    Delete,
    /// Rename, move or property change
    Metadata,
}

impl OperationKind {
    /// All kinds, in storage order
    pub const ALL: [OperationKind; 4] = [
        OperationKind::Upload,
        OperationKind::Download,
        OperationKind::Delete,
        OperationKind::Metadata,
    ];

    /// Stable storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Upload => "upload",
            OperationKind::Download => "download",
            OperationKind::Delete => "delete",
            OperationKind::Metadata => "metadata",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(OperationKind::Upload),
            "download" => Ok(OperationKind::Download),
            "delete" => Ok(OperationKind::Delete),
            "metadata" => Ok(OperationKind::Metadata),
            other => Err(DomainError::UnknownOperation(other.to_string())),
        }
    }
}

// ============================================================================
// RetryCounters
// ============================================================================

/// Failed-attempt counters, one per operation kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryCounters {
    upload: u32,
    download: u32,
    delete: u32,
    metadata: u32,
}

impl RetryCounters {
    /// Returns the counter for `kind`
    pub fn get(&self, kind: OperationKind) -> u32 {
        match kind {
            OperationKind::Upload => self.upload,
            OperationKind::Download => self.download,
            OperationKind::Delete => self.delete,
            OperationKind::Metadata => self.metadata,
        }
    }

    /// Overwrites the counter for `kind`
    pub fn set(&mut self, kind: OperationKind, value: u32) {
        match kind {
            OperationKind::Upload => self.upload = value,
            OperationKind::Download => self.download = value,
            OperationKind::Delete => self.delete = value,
            OperationKind::Metadata => self.metadata = value,
        }
    }

    /// Increments the counter for `kind` and returns the new value
    pub fn increment(&mut self, kind: OperationKind) -> u32 {
        let next = self.get(kind).saturating_add(1);
        self.set(kind, next);
        next
    }

    /// Returns true if every counter is zero
    pub fn is_clear(&self) -> bool {
        OperationKind::ALL.iter().all(|k| self.get(*k) == 0)
    }
}

// ============================================================================
// SyncItem
// ============================================================================

/// A file or folder tracked between the local tree and the repository
///
/// A record with a `remote_id` is "known": it has been transferred at
/// least once and both sides agreed on it at `remote_last_modified` /
/// `local_checksum`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncItem {
    /// Whether this item is a folder
    is_folder: bool,
    /// Absolute local path
    local_path: SyncPath,
    /// Repository path
    remote_path: RemotePath,
    /// Repository-assigned stable identifier
    remote_id: Option<RemoteId>,
    /// Repository modification timestamp at the last synchronization
    remote_last_modified: Option<DateTime<Utc>>,
    /// Content checksum at the last synchronization (files only)
    local_checksum: Option<FileHash>,
    /// Failed-attempt counters
    retry_counters: RetryCounters,
}

impl SyncItem {
    /// Creates a record for a file
    pub fn new_file(local_path: SyncPath, remote_path: RemotePath) -> Self {
        Self::new(false, local_path, remote_path)
    }

    /// Creates a record for a folder
    pub fn new_folder(local_path: SyncPath, remote_path: RemotePath) -> Self {
        Self::new(true, local_path, remote_path)
    }

    fn new(is_folder: bool, local_path: SyncPath, remote_path: RemotePath) -> Self {
        Self {
            is_folder,
            local_path,
            remote_path,
            remote_id: None,
            remote_last_modified: None,
            local_checksum: None,
            retry_counters: RetryCounters::default(),
        }
    }

    // --- Builders ---

    /// Sets the remote identifier
    #[must_use]
    pub fn with_remote_id(mut self, id: RemoteId) -> Self {
        self.remote_id = Some(id);
        self
    }

    /// Sets the last-seen repository modification time
    #[must_use]
    pub fn with_remote_last_modified(mut self, at: DateTime<Utc>) -> Self {
        self.remote_last_modified = Some(at);
        self
    }

    /// Sets the last synchronized checksum
    #[must_use]
    pub fn with_checksum(mut self, hash: FileHash) -> Self {
        self.local_checksum = Some(hash);
        self
    }

    /// Sets the retry counters
    #[must_use]
    pub fn with_retry_counters(mut self, counters: RetryCounters) -> Self {
        self.retry_counters = counters;
        self
    }

    // --- Getters ---

    /// Returns true if this item is a folder
    pub fn is_folder(&self) -> bool {
        self.is_folder
    }

    /// Returns the absolute local path
    pub fn local_path(&self) -> &SyncPath {
        &self.local_path
    }

    /// Returns the repository path
    pub fn remote_path(&self) -> &RemotePath {
        &self.remote_path
    }

    /// Returns the remote identifier, if known
    pub fn remote_id(&self) -> Option<&RemoteId> {
        self.remote_id.as_ref()
    }

    /// Returns the repository modification time at the last synchronization
    pub fn remote_last_modified(&self) -> Option<DateTime<Utc>> {
        self.remote_last_modified
    }

    /// Returns the checksum at the last synchronization
    pub fn local_checksum(&self) -> Option<&FileHash> {
        self.local_checksum.as_ref()
    }

    /// Returns the retry counters
    pub fn retry_counters(&self) -> &RetryCounters {
        &self.retry_counters
    }

    /// A record is "known" once a remote identifier has been recorded
    pub fn is_known(&self) -> bool {
        self.remote_id.is_some()
    }

    /// Returns true if the repository reports a different modification time
    /// than the one recorded at the last synchronization
    pub fn remote_changed_since_sync(&self, remote_last_modified: DateTime<Utc>) -> bool {
        self.remote_last_modified != Some(remote_last_modified)
    }

    /// Returns true if `checksum` differs from the recorded one
    pub fn local_changed_since_sync(&self, checksum: &FileHash) -> bool {
        self.local_checksum.as_ref() != Some(checksum)
    }

    // --- Mutators ---

    /// Sets the remote identifier
    pub fn set_remote_id(&mut self, id: RemoteId) {
        self.remote_id = Some(id);
    }

    /// Sets the last-seen repository modification time
    pub fn set_remote_last_modified(&mut self, at: DateTime<Utc>) {
        self.remote_last_modified = Some(at);
    }

    /// Sets the last synchronized checksum
    pub fn set_checksum(&mut self, hash: FileHash) {
        self.local_checksum = Some(hash);
    }

    /// Re-keys the record after a rename or move
    pub fn relocate(&mut self, local_path: SyncPath, remote_path: RemotePath) {
        self.local_path = local_path;
        self.remote_path = remote_path;
    }

    /// Mutable access to the retry counters
    pub fn retry_counters_mut(&mut self) -> &mut RetryCounters {
        &mut self.retry_counters
    }
}

impl fmt::Display for SyncItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_folder { "folder" } else { "file" };
        write!(f, "{} {} <-> {}", kind, self.local_path, self.remote_path)
    }
}
