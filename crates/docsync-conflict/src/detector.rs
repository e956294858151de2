//! Conflict detection logic
//!
//! Determines whether a remote change conflicts with local modifications
//! by comparing the repository timestamp and the local checksum with the
//! values recorded at the last synchronization.

use tracing::{debug, info};

use docsync_core::domain::{newtypes::FileHash, remote::RemoteObject, sync_item::SyncItem};

/// Outcome of a detection check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// At most one side changed
    NoConflict,
    /// Both sides changed but hold the same bytes
    Converged,
    /// Both sides changed to different content
    Conflicted,
}

/// Detects conflicts between local and remote file versions
pub struct ConflictDetector;

impl ConflictDetector {
    /// Checks a known item against the current remote object and local checksum
    ///
    /// A conflict exists when:
    /// 1. The repository timestamp differs from the recorded one, AND
    /// 2. The local checksum differs from the recorded one.
    ///
    /// When the repository reports a content hash equal to the local
    /// checksum, both sides converged and the result is `Converged`.
    pub fn check(existing: &SyncItem, remote: &RemoteObject, local_checksum: &FileHash) -> Detection {
        let remote_changed = existing.remote_changed_since_sync(remote.last_modified);
        let local_changed = existing.local_changed_since_sync(local_checksum);

        if !(remote_changed && local_changed) {
            return Detection::NoConflict;
        }

        if Self::same_content(remote, local_checksum) {
            debug!(
                path = %existing.local_path(),
                "Both sides changed to identical content"
            );
            return Detection::Converged;
        }

        info!(
            path = %existing.local_path(),
            recorded_hash = ?existing.local_checksum().map(|h| h.as_str()),
            local_hash = %local_checksum,
            remote_modified = %remote.last_modified,
            "Conflict detected: both local and remote versions changed"
        );
        Detection::Conflicted
    }

    /// Returns true if the repository reports exactly the local content
    pub fn same_content(remote: &RemoteObject, local_checksum: &FileHash) -> bool {
        remote.content_hash.as_ref() == Some(local_checksum)
    }
}
