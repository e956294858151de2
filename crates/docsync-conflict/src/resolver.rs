//! Conflict resolution
//!
//! Decides the outcome of a detected conflict and preserves the losing
//! local copy:
//! - `RemoteWins`: the local file is renamed to a free conflict copy name
//!   and the user is notified; the caller then downloads the remote version
//!   into the original path.
//! - `LocalWins`: only for paths matched by a `local` policy rule; the caller
//!   uploads the local content over the remote document.

use std::sync::Arc;

use tracing::{debug, info, warn};

use docsync_core::{
    domain::{
        conflict::{Conflict, Resolution},
        newtypes::{FileHash, SyncPath},
        remote::RemoteObject,
        sync_item::SyncItem,
        DomainError,
    },
    ports::{ILocalFileSystem, INotificationService, Notification},
};

use crate::{
    detector::{ConflictDetector, Detection},
    error::ConflictError,
    namer::ConflictNamer,
    policy::{ConflictPolicy, Winner},
};

/// Decides and applies conflict resolutions for one synchronized folder
pub struct ConflictResolver {
    local_filesystem: Arc<dyn ILocalFileSystem>,
    notifier: Arc<dyn INotificationService>,
    policy: ConflictPolicy,
    namer: ConflictNamer,
    user: String,
    sync_root: SyncPath,
}

impl ConflictResolver {
    pub fn new(
        local_filesystem: Arc<dyn ILocalFileSystem>,
        notifier: Arc<dyn INotificationService>,
        policy: ConflictPolicy,
        user: impl Into<String>,
        sync_root: SyncPath,
    ) -> Self {
        let namer = ConflictNamer::new(policy.suffix_template());
        Self {
            local_filesystem,
            notifier,
            policy,
            namer,
            user: user.into(),
            sync_root,
        }
    }

    pub fn policy(&self) -> &ConflictPolicy {
        &self.policy
    }

    pub fn namer(&self) -> &ConflictNamer {
        &self.namer
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Resolves a known item against its current remote and local versions
    ///
    /// Returns `NoConflict` unless both sides changed to different content.
    pub async fn resolve(
        &self,
        item: &SyncItem,
        remote: &RemoteObject,
        local_checksum: &FileHash,
    ) -> Result<Resolution, ConflictError> {
        match ConflictDetector::check(item, remote, local_checksum) {
            Detection::NoConflict | Detection::Converged => Ok(Resolution::NoConflict),
            Detection::Conflicted => self.decide(item.local_path(), remote).await,
        }
    }

    /// Picks the winner for a path already known to be in conflict
    ///
    /// Used directly for unrecorded files that exist on both sides with
    /// different content.
    pub async fn decide(
        &self,
        local_path: &SyncPath,
        remote: &RemoteObject,
    ) -> Result<Resolution, ConflictError> {
        let relative = local_path.relative_to(&self.sync_root)?;
        let relative = relative.to_string_lossy();

        let resolution = match self.policy.winner_for(&relative) {
            Winner::Local => Resolution::LocalWins,
            Winner::Remote => Resolution::RemoteWins {
                rename_local_to: self.free_conflict_path(local_path).await?,
            },
        };

        debug!(
            path = %local_path,
            remote_id = %remote.id,
            resolution = %resolution,
            "Conflict resolution decided"
        );
        Ok(resolution)
    }

    /// Moves the local copy aside and tells the user about it
    ///
    /// The preserved copy is never deleted automatically. A failed
    /// notification is logged and otherwise ignored.
    pub async fn preserve_local(
        &self,
        conflict: &Conflict,
        rename_to: &SyncPath,
    ) -> Result<(), ConflictError> {
        self.local_filesystem
            .rename(conflict.local_path(), rename_to)
            .await?;

        info!(
            original = %conflict.local_path(),
            kept_as = %rename_to,
            remote_editor = %conflict.remote_editor(),
            "Local edits preserved as conflict copy"
        );

        let notification = Notification::conflict_resolved(
            &conflict.local_path().to_string(),
            &rename_to.to_string(),
            conflict.remote_editor(),
        );
        if let Err(e) = self.notifier.notify(&notification).await {
            warn!(error = %e, "Failed to deliver conflict notification");
        }
        Ok(())
    }

    /// First conflict copy name next to `local_path` that is not taken
    async fn free_conflict_path(&self, local_path: &SyncPath) -> Result<SyncPath, ConflictError> {
        let name = local_path
            .file_name()
            .ok_or_else(|| DomainError::InvalidPath(local_path.to_string()))?;
        let parent = local_path
            .parent()
            .ok_or_else(|| DomainError::InvalidPath(local_path.to_string()))?;

        let max = self.policy.max_probe_index();
        for index in 1..=max {
            let candidate = parent.join(&self.namer.candidate(name, &self.user, index))?;
            if !self.local_filesystem.exists(&candidate).await? {
                return Ok(candidate);
            }
        }

        Err(ConflictError::ProbeExhausted {
            path: local_path.to_string(),
            max,
        })
    }
}
