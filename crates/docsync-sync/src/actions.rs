//! Per-item operations shared by the three reconcilers
//!
//! Every transfer, deletion and conflict resolution goes through
//! [`ItemActions`], which owns the failure policy:
//!
//! - **Retry bound**: an operation whose counter reached the limit is
//!   skipped with a warning before any repository call is made.
//! - **Not found**: the object is already gone; nothing to do.
//! - **Name rejected**: the item is skipped with a warning.
//! - **Transient or permission errors**: the counter is bumped and the pass
//!   is marked failed, but the walk continues.
//! - **Local filesystem errors**: the item is skipped with a warning.
//! - **State store errors**: the pass is marked failed.
//!
//! Only cancellation escapes as an `Err`, so one item never unwinds a walk.

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use docsync_conflict::ConflictDetector;
use docsync_core::{
    domain::{
        Conflict, DomainError, ExceptionKind, FileHash, OperationKind, RemoteId, RemoteObject,
        RemotePath, Resolution, SyncItem, SyncPath,
    },
    ports::RemoteError,
};

use crate::{
    context::SyncContext, control::SyncControl, filesystem::hash_bytes, filter::SyncFilter,
    report::PassReport, BoxFuture, SyncError,
};

/// Maps a repository failure to the exception category reported upward
pub(crate) fn exception_kind(err: &RemoteError) -> ExceptionKind {
    match err {
        RemoteError::PermissionDenied(_) => ExceptionKind::PermissionDenied,
        e if e.is_transient() => ExceptionKind::ConnectionLost,
        _ => ExceptionKind::Unexpected,
    }
}

fn file_name(path: &SyncPath) -> Result<&str, SyncError> {
    path.file_name()
        .ok_or_else(|| DomainError::InvalidPath(path.to_string()).into())
}

// ============================================================================
// ItemActions
// ============================================================================

pub struct ItemActions {
    ctx: Arc<SyncContext>,
    control: Arc<SyncControl>,
}

impl ItemActions {
    pub fn new(ctx: Arc<SyncContext>, control: Arc<SyncControl>) -> Self {
        Self { ctx, control }
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    pub fn control(&self) -> &SyncControl {
        &self.control
    }

    // ------------------------------------------------------------------------
    // State store helpers
    // ------------------------------------------------------------------------

    pub async fn record(&self, path: &SyncPath) -> Result<Option<SyncItem>, SyncError> {
        self.ctx
            .state
            .get_item(path)
            .await
            .map_err(SyncError::StateStore)
    }

    pub async fn record_by_id(&self, id: &RemoteId) -> Result<Option<SyncItem>, SyncError> {
        self.ctx
            .state
            .get_item_by_remote_id(id)
            .await
            .map_err(SyncError::StateStore)
    }

    async fn save(&self, item: &SyncItem) -> Result<(), SyncError> {
        self.ctx
            .state
            .save_item(item)
            .await
            .map_err(SyncError::StateStore)
    }

    pub async fn forget(&self, path: &SyncPath) -> Result<u64, SyncError> {
        self.ctx
            .state
            .remove_item(path)
            .await
            .map_err(SyncError::StateStore)
    }

    // ------------------------------------------------------------------------
    // Failure policy
    // ------------------------------------------------------------------------

    /// Settles the outcome of one item operation
    ///
    /// Success resets the retry counter. Failures are classified as
    /// described in the module docs; only cancellation is returned.
    pub async fn settle(
        &self,
        report: &mut PassReport,
        path: &SyncPath,
        kind: OperationKind,
        result: Result<(), SyncError>,
    ) -> Result<(), SyncError> {
        let state = self.ctx.state.as_ref();
        let err = match result {
            Ok(()) => {
                if let Err(e) = self.ctx.retries.record_success(state, path, kind).await {
                    report.fail(ExceptionKind::StateStore, e.to_string());
                }
                return Ok(());
            }
            Err(err) => err,
        };

        match &err {
            SyncError::Cancelled => return Err(SyncError::Cancelled),
            SyncError::Remote(e) if e.is_not_found() => {
                debug!(path = %path, operation = kind.as_str(), "Object already gone");
            }
            SyncError::Remote(RemoteError::NameConstraintViolation(reason)) => {
                warn!(path = %path, operation = kind.as_str(), %reason, "Name rejected by repository, skipping");
                report.skipped += 1;
            }
            SyncError::Remote(e) => {
                let attempts = match self.ctx.retries.record_failure(state, path, kind).await {
                    Ok(n) => n,
                    Err(se) => {
                        report.fail(ExceptionKind::StateStore, se.to_string());
                        0
                    }
                };
                warn!(
                    path = %path,
                    operation = kind.as_str(),
                    attempts,
                    error = %e,
                    "Repository operation failed"
                );
                report.fail(exception_kind(e), format!("{} {}: {}", kind.as_str(), path, e));
            }
            SyncError::StateStore(e) => {
                error!(path = %path, error = %e, "State store failure");
                report.fail(ExceptionKind::StateStore, format!("{path}: {e}"));
            }
            SyncError::LocalFs(_) | SyncError::Conflict(_) | SyncError::Domain(_) => {
                warn!(path = %path, operation = kind.as_str(), error = %err, "Skipping item");
                report.skipped += 1;
            }
            SyncError::Watcher(msg) => {
                report.fail(ExceptionKind::Unexpected, msg.clone());
            }
        }
        Ok(())
    }

    /// Checks the retry bound; a refused operation counts as a skip
    pub(crate) async fn permitted(&self, report: &mut PassReport, path: &SyncPath, kind: OperationKind) -> bool {
        match self
            .ctx
            .retries
            .permits(self.ctx.state.as_ref(), path, kind)
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                report.skipped += 1;
                false
            }
            Err(e) => {
                report.fail(ExceptionKind::StateStore, e.to_string());
                false
            }
        }
    }

    /// Whether a child named `name` takes part in synchronization
    ///
    /// Invalid names are counted as skips; ignored ones are silent.
    pub fn admits(&self, name: &str, remote: Option<&RemotePath>, report: &mut PassReport) -> bool {
        if remote.is_some_and(|p| !self.ctx.in_scope(p)) {
            debug!(name, "Outside the synchronized scope");
            return false;
        }
        if self.ctx.filter.is_ignored_name(name) {
            debug!(name, "Ignored name");
            return false;
        }
        if SyncFilter::is_invalid_name(name) {
            warn!(name, "Invalid name, skipping");
            report.skipped += 1;
            return false;
        }
        true
    }

    /// Remote id of the folder that mirrors `local_dir`
    pub async fn remote_folder_id(&self, local_dir: &SyncPath) -> Result<RemoteId, SyncError> {
        if let Some(record) = self.record(local_dir).await? {
            if let (true, Some(id)) = (record.is_folder(), record.remote_id()) {
                return Ok(id.clone());
            }
        }
        let remote_path = self.ctx.remote_path_for(local_dir)?;
        let folder = self.ctx.remote.get_object_by_path(&remote_path).await?;
        if !folder.is_folder() {
            return Err(RemoteError::NameConstraintViolation(format!(
                "{remote_path} is not a folder"
            ))
            .into());
        }
        Ok(folder.id)
    }

    // ------------------------------------------------------------------------
    // Downloads
    // ------------------------------------------------------------------------

    /// Downloads a document into `local_path` and records it
    #[instrument(skip(self, remote, report), fields(path = %local_path))]
    pub async fn download_file(
        &self,
        remote: &RemoteObject,
        local_path: &SyncPath,
        report: &mut PassReport,
    ) -> Result<(), SyncError> {
        if !self.permitted(report, local_path, OperationKind::Download).await {
            return Ok(());
        }
        let result = self.fetch(remote, local_path).await;
        if result.is_ok() {
            info!(remote_id = %remote.id, size = remote.size, "Downloaded file");
            report.downloads += 1;
        }
        self.settle(report, local_path, OperationKind::Download, result)
            .await
    }

    async fn fetch(&self, remote: &RemoteObject, local_path: &SyncPath) -> Result<(), SyncError> {
        let data = self.ctx.remote.get_content_stream(&remote.id).await?;
        self.ctx
            .local
            .write_file(local_path, &data, Some(remote.last_modified))
            .await
            .map_err(SyncError::LocalFs)?;
        let checksum = hash_bytes(&data).map_err(SyncError::LocalFs)?;

        let item = SyncItem::new_file(local_path.clone(), remote.path.clone())
            .with_remote_id(remote.id.clone())
            .with_remote_last_modified(remote.last_modified)
            .with_checksum(checksum);
        self.save(&item).await
    }

    /// Records a folder that exists on both sides
    pub async fn adopt_folder(
        &self,
        remote: &RemoteObject,
        local_dir: &SyncPath,
        report: &mut PassReport,
    ) -> Result<(), SyncError> {
        let result: Result<(), SyncError> = async {
            if self.record(local_dir).await?.is_some_and(|r| r.is_folder()) {
                return Ok(());
            }
            debug!(path = %local_dir, "Recording folder present on both sides");
            let item = SyncItem::new_folder(local_dir.clone(), remote.path.clone())
                .with_remote_id(remote.id.clone())
                .with_remote_last_modified(remote.last_modified);
            self.save(&item).await
        }
        .await;
        self.settle(report, local_dir, OperationKind::Metadata, result)
            .await
    }

    /// Creates `local_dir` and downloads everything below `remote`
    pub fn download_folder<'a>(
        &'a self,
        remote: &'a RemoteObject,
        local_dir: &'a SyncPath,
        report: &'a mut PassReport,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.control.checkpoint().await?;
            if !self.permitted(report, local_dir, OperationKind::Download).await {
                return Ok(());
            }

            let result: Result<Vec<RemoteObject>, SyncError> = async {
                self.ctx
                    .local
                    .create_dir_all(local_dir)
                    .await
                    .map_err(SyncError::LocalFs)?;
                let item = SyncItem::new_folder(local_dir.clone(), remote.path.clone())
                    .with_remote_id(remote.id.clone())
                    .with_remote_last_modified(remote.last_modified);
                self.save(&item).await?;
                Ok(self.ctx.remote.get_children(&remote.id).await?)
            }
            .await;

            let children = match result {
                Ok(children) => {
                    info!(path = %local_dir, "Created local folder");
                    children
                }
                Err(e) => {
                    self.settle(report, local_dir, OperationKind::Download, Err(e))
                        .await?;
                    return Ok(());
                }
            };

            for child in &children {
                if !self.admits(&child.name, Some(&child.path), report) {
                    continue;
                }
                let child_path = match local_dir.join(&child.name) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(name = %child.name, error = %e, "Skipping unrepresentable name");
                        report.skipped += 1;
                        continue;
                    }
                };
                if child.is_folder() {
                    self.download_folder(child, &child_path, report).await?;
                } else {
                    self.control.checkpoint().await?;
                    self.download_file(child, &child_path, report).await?;
                }
            }
            Ok(())
        })
    }

    // ------------------------------------------------------------------------
    // Uploads
    // ------------------------------------------------------------------------

    /// Uploads a file the repository has never seen
    ///
    /// If the name is already taken remotely, the existing document is
    /// reconciled against the local file instead.
    #[instrument(skip(self, parent, report), fields(path = %local_path))]
    pub async fn upload_new_file(
        &self,
        local_path: &SyncPath,
        parent: &RemoteId,
        report: &mut PassReport,
    ) -> Result<(), SyncError> {
        if !self.ctx.settings.bidirectional {
            debug!("Download-only, not uploading");
            return Ok(());
        }
        if !self.permitted(report, local_path, OperationKind::Upload).await {
            return Ok(());
        }

        match self.push_new(local_path, parent).await {
            Ok(remote_id) => {
                info!(remote_id = %remote_id, "Uploaded new file");
                report.uploads += 1;
                self.settle(report, local_path, OperationKind::Upload, Ok(()))
                    .await
            }
            Err(SyncError::Remote(RemoteError::NameConstraintViolation(reason))) => {
                match self.existing_document(local_path).await {
                    Ok(Some(existing)) => {
                        debug!("Name already taken remotely, reconciling with it");
                        self.reconcile_file(&existing, local_path, None, report)
                            .await
                    }
                    Ok(None) => {
                        let err = RemoteError::NameConstraintViolation(reason).into();
                        self.settle(report, local_path, OperationKind::Upload, Err(err))
                            .await
                    }
                    Err(e) => {
                        self.settle(report, local_path, OperationKind::Upload, Err(e))
                            .await
                    }
                }
            }
            Err(e) => {
                self.settle(report, local_path, OperationKind::Upload, Err(e))
                    .await
            }
        }
    }

    async fn existing_document(&self, local_path: &SyncPath) -> Result<Option<RemoteObject>, SyncError> {
        let remote_path = self.ctx.remote_path_for(local_path)?;
        match self.ctx.remote.get_object_by_path(&remote_path).await {
            Ok(obj) if obj.is_document() => Ok(Some(obj)),
            Ok(_) => Ok(None),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn push_new(&self, local_path: &SyncPath, parent: &RemoteId) -> Result<RemoteId, SyncError> {
        let name = file_name(local_path)?;
        let data = self
            .ctx
            .local
            .read_file(local_path)
            .await
            .map_err(SyncError::LocalFs)?;
        let created = self.ctx.remote.create_document(parent, name, &data).await?;
        let checksum = hash_bytes(&data).map_err(SyncError::LocalFs)?;

        let item = SyncItem::new_file(local_path.clone(), created.path.clone())
            .with_remote_id(created.id.clone())
            .with_remote_last_modified(created.last_modified)
            .with_checksum(checksum);
        self.save(&item).await?;
        Ok(created.id)
    }

    /// Replaces the remote content of a recorded file with the local content
    #[instrument(skip(self, item, report), fields(path = %item.local_path()))]
    pub async fn upload_content(
        &self,
        mut item: SyncItem,
        report: &mut PassReport,
    ) -> Result<(), SyncError> {
        if !self.ctx.settings.bidirectional {
            debug!("Download-only, not uploading");
            return Ok(());
        }
        let path = item.local_path().clone();
        if !self.permitted(report, &path, OperationKind::Upload).await {
            return Ok(());
        }
        let result = self.push_content(&mut item).await;
        if result.is_ok() {
            info!("Uploaded new content");
            report.uploads += 1;
        }
        self.settle(report, &path, OperationKind::Upload, result)
            .await
    }

    async fn push_content(&self, item: &mut SyncItem) -> Result<(), SyncError> {
        let id = item
            .remote_id()
            .cloned()
            .ok_or_else(|| DomainError::InvalidRemoteId(item.local_path().to_string()))?;
        let data = self
            .ctx
            .local
            .read_file(item.local_path())
            .await
            .map_err(SyncError::LocalFs)?;
        let updated = self.ctx.remote.set_content_stream(&id, &data).await?;

        item.set_remote_last_modified(updated.last_modified);
        item.set_checksum(hash_bytes(&data).map_err(SyncError::LocalFs)?);
        self.save(item).await
    }

    /// Creates the remote folder for `local_dir` and uploads its content
    pub fn upload_folder<'a>(
        &'a self,
        local_dir: &'a SyncPath,
        parent: &'a RemoteId,
        report: &'a mut PassReport,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if !self.ctx.settings.bidirectional {
                return Ok(());
            }
            self.control.checkpoint().await?;
            if !self.permitted(report, local_dir, OperationKind::Upload).await {
                return Ok(());
            }

            let result: Result<_, SyncError> = async {
                let folder = self.push_folder(local_dir, parent).await?;
                let entries = self
                    .ctx
                    .local
                    .list_dir(local_dir)
                    .await
                    .map_err(SyncError::LocalFs)?;
                Ok((folder, entries))
            }
            .await;

            let (folder, entries) = match result {
                Ok(ok) => ok,
                Err(e) => {
                    self.settle(report, local_dir, OperationKind::Upload, Err(e))
                        .await?;
                    return Ok(());
                }
            };
            self.settle(report, local_dir, OperationKind::Upload, Ok(()))
                .await?;

            for entry in &entries {
                if !self.admits(&entry.name, None, report) {
                    continue;
                }
                if entry.is_dir {
                    self.upload_folder(&entry.path, &folder, report).await?;
                } else {
                    self.control.checkpoint().await?;
                    self.upload_new_file(&entry.path, &folder, report).await?;
                }
            }
            Ok(())
        })
    }

    async fn push_folder(&self, local_dir: &SyncPath, parent: &RemoteId) -> Result<RemoteId, SyncError> {
        let name = file_name(local_dir)?;
        let folder = match self.ctx.remote.create_folder(parent, name).await {
            Ok(folder) => {
                info!(path = %local_dir, remote_id = %folder.id, "Created remote folder");
                folder
            }
            Err(RemoteError::NameConstraintViolation(reason)) => {
                let remote_path = self.ctx.remote_path_for(local_dir)?;
                let existing = self.ctx.remote.get_object_by_path(&remote_path).await?;
                if !existing.is_folder() {
                    return Err(RemoteError::NameConstraintViolation(reason).into());
                }
                debug!(path = %local_dir, "Remote folder already exists, adopting it");
                existing
            }
            Err(e) => return Err(e.into()),
        };

        let item = SyncItem::new_folder(local_dir.clone(), folder.path.clone())
            .with_remote_id(folder.id.clone())
            .with_remote_last_modified(folder.last_modified);
        self.save(&item).await?;
        Ok(folder.id)
    }

    // ------------------------------------------------------------------------
    // Deletions
    // ------------------------------------------------------------------------

    /// Deletes the remote counterpart of a locally deleted item
    ///
    /// The record is only removed once the whole remote subtree is gone.
    #[instrument(skip(self, item, report), fields(path = %item.local_path()))]
    pub async fn delete_remote(
        &self,
        item: &SyncItem,
        report: &mut PassReport,
    ) -> Result<(), SyncError> {
        if !self.ctx.settings.bidirectional {
            return Ok(());
        }
        let path = item.local_path();
        if !self.permitted(report, path, OperationKind::Delete).await {
            return Ok(());
        }
        let result = self.remove_remote(item).await;
        if result.is_ok() {
            info!(remote_path = %item.remote_path(), "Deleted remotely");
            report.remote_deletions += 1;
        }
        self.settle(report, path, OperationKind::Delete, result)
            .await
    }

    async fn remove_remote(&self, item: &SyncItem) -> Result<(), SyncError> {
        if let Some(id) = item.remote_id() {
            let outcome = if item.is_folder() {
                match self.ctx.remote.delete_tree(id, true).await {
                    Ok(failed) if failed.is_empty() => Ok(()),
                    Ok(failed) => Err(RemoteError::PermissionDenied(format!(
                        "{} objects below {} could not be deleted",
                        failed.len(),
                        item.remote_path()
                    ))),
                    Err(e) => Err(e),
                }
            } else {
                self.ctx.remote.delete_all_versions(id).await
            };
            match outcome {
                Ok(()) => {}
                Err(e) if e.is_not_found() => debug!("Already deleted remotely"),
                Err(e) => return Err(e.into()),
            }
        }
        self.forget(item.local_path()).await?;
        Ok(())
    }

    /// Applies a remote deletion to the local tree
    ///
    /// Only content unchanged since the last sync is removed. Whatever
    /// survives loses its record, so it is treated as a new local item from
    /// now on. Returns whether the local artifact is completely gone.
    #[instrument(skip(self, item, report), fields(path = %item.local_path()))]
    pub async fn delete_local(
        &self,
        item: &SyncItem,
        report: &mut PassReport,
    ) -> Result<bool, SyncError> {
        let path = item.local_path();
        let result: Result<bool, SyncError> = async {
            let removed = self.prune(path).await?;
            self.forget(path).await?;
            Ok(removed)
        }
        .await;

        match result {
            Ok(true) => {
                info!("Deleted locally after remote deletion");
                report.local_deletions += 1;
                Ok(true)
            }
            Ok(false) => {
                info!("Kept local changes after remote deletion");
                Ok(false)
            }
            Err(e) => {
                self.settle(report, path, OperationKind::Delete, Err(e))
                    .await?;
                Ok(false)
            }
        }
    }

    fn prune<'a>(&'a self, path: &'a SyncPath) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            self.control.checkpoint().await?;
            let local = &self.ctx.local;
            let stat = local.stat(path).await.map_err(SyncError::LocalFs)?;
            if !stat.exists {
                return Ok(true);
            }
            let record = self.record(path).await?;

            if !stat.is_dir {
                let Some(recorded) = record.as_ref().and_then(|r| r.local_checksum()) else {
                    return Ok(false);
                };
                let current = local.compute_hash(path).await.map_err(SyncError::LocalFs)?;
                if &current != recorded {
                    debug!(path = %path, "Modified since last sync, keeping");
                    return Ok(false);
                }
                local.remove_file(path).await.map_err(SyncError::LocalFs)?;
                return Ok(true);
            }

            if record.is_none() {
                return Ok(false);
            }
            let mut all_removed = true;
            for entry in local.list_dir(path).await.map_err(SyncError::LocalFs)? {
                if !self.prune(&entry.path).await? {
                    all_removed = false;
                }
            }
            if all_removed {
                local.remove_dir_all(path).await.map_err(SyncError::LocalFs)?;
            }
            Ok(all_removed)
        })
    }

    // ------------------------------------------------------------------------
    // File reconciliation
    // ------------------------------------------------------------------------

    /// Reconciles a document with the local file at the same path
    ///
    /// | record | remote changed | local changed | action           |
    /// |--------|----------------|---------------|------------------|
    /// | none   | same content   |               | adopt            |
    /// | none   | other content  |               | conflict         |
    /// | some   | no             | no            | nothing          |
    /// | some   | yes            | no            | download         |
    /// | some   | no             | yes           | upload           |
    /// | some   | yes            | yes           | conflict         |
    pub async fn reconcile_file(
        &self,
        remote: &RemoteObject,
        local_path: &SyncPath,
        record: Option<SyncItem>,
        report: &mut PassReport,
    ) -> Result<(), SyncError> {
        let checksum = match self.ctx.local.compute_hash(local_path).await {
            Ok(checksum) => checksum,
            Err(e) => {
                return self
                    .settle(report, local_path, OperationKind::Upload, Err(SyncError::LocalFs(e)))
                    .await;
            }
        };

        let Some(mut record) = record else {
            if ConflictDetector::same_content(remote, &checksum) {
                debug!(path = %local_path, "Identical content on both sides, adopting");
                let item = SyncItem::new_file(local_path.clone(), remote.path.clone())
                    .with_remote_id(remote.id.clone())
                    .with_remote_last_modified(remote.last_modified)
                    .with_checksum(checksum);
                let result = self.save(&item).await;
                return self
                    .settle(report, local_path, OperationKind::Metadata, result)
                    .await;
            }
            return match self.ctx.resolver.decide(local_path, remote).await {
                Ok(resolution) => {
                    self.apply_resolution(resolution, remote, local_path, None, report)
                        .await
                }
                Err(e) => {
                    self.settle(report, local_path, OperationKind::Download, Err(e.into()))
                        .await
                }
            };
        };

        let remote_changed = record.remote_changed_since_sync(remote.last_modified);
        let local_changed = record.local_changed_since_sync(&checksum);
        debug!(path = %local_path, remote_changed, local_changed, "Comparing file");

        match (remote_changed, local_changed) {
            (false, false) => Ok(()),
            (true, false) => self.download_file(remote, local_path, report).await,
            (false, true) => {
                if !self.ctx.settings.bidirectional {
                    debug!(path = %local_path, "Local edit left alone in download-only mode");
                    return Ok(());
                }
                self.upload_content(record, report).await
            }
            (true, true) => match self.ctx.resolver.resolve(&record, remote, &checksum).await {
                Ok(Resolution::NoConflict) => {
                    debug!(path = %local_path, "Both sides converged, refreshing record");
                    record.set_remote_id(remote.id.clone());
                    record.set_remote_last_modified(remote.last_modified);
                    record.set_checksum(checksum);
                    let result = self.save(&record).await;
                    self.settle(report, local_path, OperationKind::Metadata, result)
                        .await
                }
                Ok(resolution) => {
                    self.apply_resolution(resolution, remote, local_path, Some(record), report)
                        .await
                }
                Err(e) => {
                    self.settle(report, local_path, OperationKind::Download, Err(e.into()))
                        .await
                }
            },
        }
    }

    async fn apply_resolution(
        &self,
        resolution: Resolution,
        remote: &RemoteObject,
        local_path: &SyncPath,
        record: Option<SyncItem>,
        report: &mut PassReport,
    ) -> Result<(), SyncError> {
        match resolution {
            Resolution::NoConflict => Ok(()),
            Resolution::RemoteWins { rename_local_to } => {
                if !self.permitted(report, local_path, OperationKind::Download).await {
                    return Ok(());
                }
                let conflict = Conflict::new(
                    local_path.clone(),
                    remote.clone(),
                    self.ctx.resolver.user(),
                );
                if let Err(e) = self.ctx.resolver.preserve_local(&conflict, &rename_local_to).await {
                    return self
                        .settle(report, local_path, OperationKind::Download, Err(e.into()))
                        .await;
                }
                report.conflicts += 1;
                self.download_file(remote, local_path, report).await
            }
            Resolution::LocalWins => {
                if !self.ctx.settings.bidirectional {
                    debug!(path = %local_path, "Local copy wins but uploads are disabled");
                    return Ok(());
                }
                let mut item = record
                    .unwrap_or_else(|| SyncItem::new_file(local_path.clone(), remote.path.clone()));
                item.set_remote_id(remote.id.clone());
                info!(path = %local_path, "Conflict resolved in favour of the local copy");
                report.conflicts += 1;
                self.upload_content(item, report).await
            }
        }
    }

    /// Whether the checksum of a local file still matches `expected`
    pub async fn unchanged_since(&self, path: &SyncPath, expected: Option<&FileHash>) -> bool {
        match (expected, self.ctx.local.compute_hash(path).await) {
            (Some(expected), Ok(current)) => &current == expected,
            _ => false,
        }
    }
}
