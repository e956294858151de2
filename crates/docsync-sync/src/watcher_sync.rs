//! Reconciliation of coalesced local filesystem events
//!
//! The [`WatcherReconciler`] drains the event queue in one go and applies
//! each event to the repository:
//!
//! - **Created / Changed**: upload unknown files, push new content of known
//!   files, upload new folders recursively.
//! - **Deleted**: wait once per pass for editors that save through a
//!   temporary file, then delete remotely if the path is still gone.
//! - **Renamed**: a rename in place or a move to another folder keeps the
//!   remote object identity; anything else becomes delete plus create.
//!
//! A failed event fails the pass; the orchestrator then schedules a crawl,
//! which picks up whatever was not applied.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use docsync_core::domain::{
    FsEvent, FsEventKind, ObjectProperties, OperationKind, RemoteId, SyncItem, SyncPath,
};

use crate::{actions::ItemActions, report::PassReport, BoxFuture, SyncError};

pub struct WatcherReconciler {
    actions: Arc<ItemActions>,
}

/// Per-pass state shared by the event handlers
#[derive(Debug, Default)]
struct Pass {
    report: PassReport,
    /// The delete re-check delay has already been slept
    delayed: bool,
}

impl WatcherReconciler {
    pub fn new(actions: Arc<ItemActions>) -> Self {
        Self { actions }
    }

    /// Applies every event queued since the previous pass
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<PassReport, SyncError> {
        let ctx = self.actions.context();
        let events = ctx.events.drain();
        let mut pass = Pass::default();
        if events.is_empty() {
            return Ok(pass.report);
        }
        if !ctx.settings.bidirectional {
            debug!(count = events.len(), "Download-only, discarding local events");
            return Ok(pass.report);
        }

        info!(count = events.len(), "Applying local events");
        for event in events {
            self.actions.control().checkpoint().await?;
            self.apply(event, &mut pass).await?;
        }
        Ok(pass.report)
    }

    async fn apply(&self, event: FsEvent, pass: &mut Pass) -> Result<(), SyncError> {
        debug!(event = %event, "Local event");
        let Some(path) = self.tracked_path(&event.path) else {
            return Ok(());
        };

        match &event.kind {
            FsEventKind::Created | FsEventKind::Changed => {
                if self.admitted(&path, pass) {
                    self.on_changed(&path, pass).await?;
                }
                Ok(())
            }
            FsEventKind::Deleted => {
                if self.admitted(&path, pass) {
                    self.on_deleted(&path, pass).await?;
                }
                Ok(())
            }
            FsEventKind::Renamed { old_path } => {
                let old = self.tracked_path(old_path);
                self.on_renamed(old, path, pass).await
            }
        }
    }

    /// Paths strictly below the local root; everything else is ignored
    fn tracked_path(&self, path: &Path) -> Option<SyncPath> {
        let path = SyncPath::new(path.to_path_buf()).ok()?;
        self.actions
            .context()
            .is_below_root(&path)
            .then_some(path)
    }

    fn admitted(&self, path: &SyncPath, pass: &mut Pass) -> bool {
        let ctx = self.actions.context();
        let Some(name) = path.file_name() else {
            return false;
        };
        let remote = ctx.remote_path_for(path).ok();
        self.actions.admits(name, remote.as_ref(), &mut pass.report)
    }

    // ------------------------------------------------------------------------
    // Created / Changed
    // ------------------------------------------------------------------------

    fn on_changed<'a>(&'a self, path: &'a SyncPath, pass: &'a mut Pass) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let actions = &self.actions;
            let ctx = actions.context();
            let report = &mut pass.report;

            let stat = match ctx.local.stat(path).await {
                Ok(stat) => stat,
                Err(e) => {
                    return actions
                        .settle(report, path, OperationKind::Upload, Err(SyncError::LocalFs(e)))
                        .await;
                }
            };
            if !stat.exists {
                debug!(path = %path, "Gone before it could be applied");
                return Ok(());
            }
            let record = match actions.record(path).await {
                Ok(record) => record,
                Err(e) => return actions.settle(report, path, OperationKind::Upload, Err(e)).await,
            };

            if let Some(record) = record {
                if stat.is_dir {
                    return Ok(());
                }
                if actions.unchanged_since(path, record.local_checksum()).await {
                    debug!(path = %path, "Content unchanged");
                    return Ok(());
                }
                return self.push_known(record, pass).await;
            }

            let Some(parent_id) = self.parent_folder(path, pass).await? else {
                return Ok(());
            };
            let report = &mut pass.report;
            if stat.is_dir {
                actions.upload_folder(path, &parent_id, report).await
            } else {
                actions.upload_new_file(path, &parent_id, report).await
            }
        })
    }

    /// Reconciles a known, locally modified file with its current remote
    /// version, so a concurrent remote edit becomes a conflict rather than
    /// being overwritten
    async fn push_known(&self, record: SyncItem, pass: &mut Pass) -> Result<(), SyncError> {
        let actions = &self.actions;
        let ctx = actions.context();
        let path = record.local_path().clone();
        let Some(id) = record.remote_id().cloned() else {
            return actions.upload_content(record, &mut pass.report).await;
        };

        match ctx.remote.get_object(&id).await {
            Ok(remote) => {
                actions
                    .reconcile_file(&remote, &path, Some(record), &mut pass.report)
                    .await
            }
            Err(e) if e.is_not_found() => {
                debug!(path = %path, "Deleted remotely, uploading as new");
                if let Err(e) = actions.forget(&path).await {
                    return actions
                        .settle(&mut pass.report, &path, OperationKind::Upload, Err(e))
                        .await;
                }
                self.on_changed(&path, pass).await
            }
            Err(e) => {
                actions
                    .settle(&mut pass.report, &path, OperationKind::Upload, Err(e.into()))
                    .await
            }
        }
    }

    /// Remote folder to upload `path` into
    ///
    /// When the parent is itself new, the parent is uploaded instead (which
    /// carries `path` along) and `None` is returned.
    async fn parent_folder(&self, path: &SyncPath, pass: &mut Pass) -> Result<Option<RemoteId>, SyncError> {
        let actions = &self.actions;
        let ctx = actions.context();
        let Some(parent) = path.parent() else {
            return Ok(None);
        };

        match actions.remote_folder_id(&parent).await {
            Ok(id) => Ok(Some(id)),
            Err(SyncError::Remote(e)) if e.is_not_found() && ctx.is_below_root(&parent) => {
                debug!(path = %path, parent = %parent, "Parent is new as well, uploading it");
                self.on_changed(&parent, pass).await?;
                Ok(None)
            }
            Err(e) => {
                actions
                    .settle(&mut pass.report, path, OperationKind::Upload, Err(e))
                    .await?;
                Ok(None)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Deleted
    // ------------------------------------------------------------------------

    async fn on_deleted(&self, path: &SyncPath, pass: &mut Pass) -> Result<(), SyncError> {
        let actions = &self.actions;
        let ctx = actions.context();
        let record = match actions.record(path).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(path = %path, "Untracked path deleted");
                return Ok(());
            }
            Err(e) => {
                return actions
                    .settle(&mut pass.report, path, OperationKind::Delete, Err(e))
                    .await;
            }
        };

        if !pass.delayed {
            pass.delayed = true;
            actions.control().sleep(ctx.settings.delete_recheck_delay).await?;
        }
        if ctx.local.exists(path).await.unwrap_or(false) {
            debug!(path = %path, "Reappeared, treating as changed");
            return self.on_changed(path, pass).await;
        }

        if let (false, Some(id)) = (record.is_folder(), record.remote_id()) {
            match ctx.remote.get_object(id).await {
                Ok(remote) if record.remote_changed_since_sync(remote.last_modified) => {
                    info!(path = %path, "Changed remotely since last sync, restoring");
                    return actions.download_file(&remote, path, &mut pass.report).await;
                }
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    debug!(path = %path, "Gone on both sides");
                    let result = actions.forget(path).await.map(|_| ());
                    return actions
                        .settle(&mut pass.report, path, OperationKind::Delete, result)
                        .await;
                }
                Err(e) => {
                    return actions
                        .settle(&mut pass.report, path, OperationKind::Delete, Err(e.into()))
                        .await;
                }
            }
        }

        actions.delete_remote(&record, &mut pass.report).await
    }

    // ------------------------------------------------------------------------
    // Renamed
    // ------------------------------------------------------------------------

    async fn on_renamed(&self, old: Option<SyncPath>, new: SyncPath, pass: &mut Pass) -> Result<(), SyncError> {
        let actions = &self.actions;
        let ctx = actions.context();
        let new_ok = self.admitted(&new, pass);
        let old = old.filter(|old| {
            old.file_name()
                .is_some_and(|name| !ctx.filter.is_ignored_name(name))
        });

        let Some(old) = old else {
            // Renamed in from outside, or from a scratch name
            if new_ok {
                self.on_changed(&new, pass).await?;
            }
            return Ok(());
        };
        if !new_ok {
            return self.on_deleted(&old, pass).await;
        }

        let record = match actions.record(&old).await {
            Ok(Some(record)) => record,
            Ok(None) => return self.on_changed(&new, pass).await,
            Err(e) => {
                return actions
                    .settle(&mut pass.report, &old, OperationKind::Metadata, Err(e))
                    .await;
            }
        };
        let collision = match actions.record(&new).await {
            Ok(existing) => existing.is_some(),
            Err(e) => {
                return actions
                    .settle(&mut pass.report, &new, OperationKind::Metadata, Err(e))
                    .await;
            }
        };
        if collision {
            debug!(old = %old, new = %new, "Target already tracked, replacing");
            self.on_deleted(&old, pass).await?;
            return self.on_changed(&new, pass).await;
        }

        let same_parent = old.parent() == new.parent();
        let same_name = old.file_name() == new.file_name();
        let Some(id) = record.remote_id().cloned() else {
            return self.on_changed(&new, pass).await;
        };

        let outcome = if same_parent && !same_name {
            let Some(name) = new.file_name() else {
                return Ok(());
            };
            if !actions.permitted(&mut pass.report, &old, OperationKind::Metadata).await {
                return Ok(());
            }
            ctx.remote
                .update_properties(&id, &ObjectProperties::rename(name))
                .await
                .map_err(SyncError::from)
        } else if !same_parent && same_name {
            let (Some(old_parent), Some(new_parent)) = (old.parent(), new.parent()) else {
                return Ok(());
            };
            let target = match actions.remote_folder_id(&new_parent).await {
                Ok(target) => target,
                Err(_) => {
                    debug!(old = %old, new = %new, "Target folder not in the repository yet");
                    self.on_deleted(&old, pass).await?;
                    return self.on_changed(&new, pass).await;
                }
            };
            if !actions.permitted(&mut pass.report, &old, OperationKind::Metadata).await {
                return Ok(());
            }
            match actions.remote_folder_id(&old_parent).await {
                Ok(source) => ctx
                    .remote
                    .move_object(&id, &source, &target)
                    .await
                    .map_err(SyncError::from),
                Err(e) => Err(e),
            }
        } else {
            debug!(old = %old, new = %new, "Not a clean rename or move");
            self.on_deleted(&old, pass).await?;
            return self.on_changed(&new, pass).await;
        };

        let moved = match outcome {
            Ok(moved) => moved,
            Err(e) => {
                return actions
                    .settle(&mut pass.report, &old, OperationKind::Metadata, Err(e))
                    .await;
            }
        };

        let result: Result<(), SyncError> = async {
            ctx.state
                .move_item(&old, &new, &moved.path)
                .await
                .map_err(SyncError::StateStore)?;
            // The rename itself bumps the remote timestamp; keep the old one
            // unless the remote bytes are still the ones last synced.
            let same_bytes = match (&moved.content_hash, record.local_checksum()) {
                (Some(remote), Some(local)) => remote == local,
                _ => record.is_folder(),
            };
            if same_bytes {
                ctx.state
                    .set_remote_last_modified(&new, moved.last_modified)
                    .await
                    .map_err(SyncError::StateStore)?;
            }
            Ok(())
        }
        .await;
        let renamed = result.is_ok();
        if renamed {
            info!(old = %old, new = %new, remote_path = %moved.path, "Renamed remotely");
            pass.report.moves += 1;
        }
        actions
            .settle(&mut pass.report, &old, OperationKind::Metadata, result)
            .await?;

        // Pending edits on either side are settled at the new location.
        if renamed && !record.is_folder() {
            match actions.record(&new).await {
                Ok(Some(current)) => {
                    actions
                        .reconcile_file(&moved, &new, Some(current), &mut pass.report)
                        .await?;
                }
                Ok(None) => {}
                Err(e) => {
                    actions
                        .settle(&mut pass.report, &new, OperationKind::Upload, Err(e))
                        .await?;
                }
            }
        }
        Ok(())
    }
}
