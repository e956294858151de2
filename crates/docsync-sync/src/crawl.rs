//! Full-tree crawl reconciliation
//!
//! The [`CrawlReconciler`] walks both trees depth-first, one folder at a
//! time. For every folder it lists the remote children and the local
//! entries, reconciles each remote child against its local counterpart,
//! then runs a local-only pass over entries the repository does not have.
//!
//! ## Per-child decisions
//!
//! | remote | local  | record | action                                         |
//! |--------|--------|--------|------------------------------------------------|
//! | folder | folder |        | record it, recurse                             |
//! | folder | absent | yes    | delete remote subtree (bidirectional)          |
//! | folder | absent | no     | download recursively                           |
//! | file   | file   |        | [`ItemActions::reconcile_file`]                |
//! | file   | absent | yes    | delete remote, or re-download if it changed    |
//! | file   | absent | no     | download                                       |
//! | absent | any    | yes    | remote deletion: delete locally                |
//! | absent | any    | no     | new local item: upload (bidirectional)         |
//!
//! A failed folder listing skips that folder's local-only pass, so nothing
//! is deleted or uploaded on the strength of a partial view.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use docsync_core::{
    domain::{ExceptionKind, OperationKind, RemoteObject, SyncPath},
    ports::{LocalEntry, Notification},
};

use crate::{
    actions::{exception_kind, ItemActions},
    report::PassReport,
    BoxFuture, SyncError,
};

/// How far [`CrawlReconciler::reconcile_folder`] descends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// One level; folders new on either side are still transferred whole
    Shallow,
    /// The whole subtree
    Recursive,
}

pub struct CrawlReconciler {
    actions: Arc<ItemActions>,
}

impl CrawlReconciler {
    pub fn new(actions: Arc<ItemActions>) -> Self {
        Self { actions }
    }

    /// Crawls everything below the remote root
    ///
    /// Also closes a round of the stale conflict copy tracker and reminds
    /// the user about copies that are still waiting for review.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<PassReport, SyncError> {
        let ctx = self.actions.context();
        let mut report = PassReport::new();
        info!(
            local_root = %ctx.settings.local_root,
            remote_root = %ctx.settings.remote_root,
            "Starting crawl"
        );

        let root = match ctx.remote.get_object_by_path(&ctx.settings.remote_root).await {
            Ok(root) if root.is_folder() => root,
            Ok(root) => {
                report.fail(
                    ExceptionKind::Unexpected,
                    format!("remote root {} is not a folder", root.path),
                );
                ctx.stale_conflicts.abandon_pass();
                return Ok(report);
            }
            Err(e) => {
                warn!(error = %e, "Remote root unavailable");
                report.fail(exception_kind(&e), format!("remote root: {e}"));
                ctx.stale_conflicts.abandon_pass();
                return Ok(report);
            }
        };

        if let Err(e) = ctx.local.create_dir_all(&ctx.settings.local_root).await {
            report.fail(ExceptionKind::LocalFilesystem, format!("local root: {e}"));
            ctx.stale_conflicts.abandon_pass();
            return Ok(report);
        }

        let local_root = ctx.settings.local_root.clone();
        if let Err(e) = self
            .walk(&root, &local_root, Depth::Recursive, true, &mut report)
            .await
        {
            ctx.stale_conflicts.abandon_pass();
            return Err(e);
        }

        if report.success() {
            for (path, passes) in ctx.stale_conflicts.finish_pass() {
                warn!(path = %path, passes, "Conflict copy still unresolved");
                let notification = Notification::stale_conflict(&path.to_string(), passes);
                if let Err(e) = ctx.notifier.notify(&notification).await {
                    warn!(error = %e, "Failed to deliver reminder");
                }
            }
        } else {
            ctx.stale_conflicts.abandon_pass();
        }

        info!(
            uploads = report.uploads,
            downloads = report.downloads,
            remote_deletions = report.remote_deletions,
            local_deletions = report.local_deletions,
            conflicts = report.conflicts,
            skipped = report.skipped,
            success = report.success(),
            "Crawl finished"
        );
        Ok(report)
    }

    /// Reconciles one remote folder with its local counterpart
    pub async fn reconcile_folder(
        &self,
        remote: &RemoteObject,
        depth: Depth,
        report: &mut PassReport,
    ) -> Result<(), SyncError> {
        let local_dir = self.actions.context().local_path_for(&remote.path)?;
        self.walk(remote, &local_dir, depth, false, report).await
    }

    fn walk<'a>(
        &'a self,
        remote: &'a RemoteObject,
        local_dir: &'a SyncPath,
        depth: Depth,
        observe: bool,
        report: &'a mut PassReport,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let actions = &self.actions;
            let ctx = actions.context();
            actions.control().checkpoint().await?;
            debug!(path = %local_dir, "Crawling folder");

            let children = match ctx.remote.get_children(&remote.id).await {
                Ok(children) => children,
                Err(e) => {
                    actions
                        .settle(report, local_dir, OperationKind::Download, Err(e.into()))
                        .await?;
                    return Ok(());
                }
            };
            let locals: HashMap<String, LocalEntry> = match ctx.local.list_dir(local_dir).await {
                Ok(entries) => entries.into_iter().map(|e| (e.name.clone(), e)).collect(),
                Err(e) => {
                    actions
                        .settle(report, local_dir, OperationKind::Download, Err(SyncError::LocalFs(e)))
                        .await?;
                    return Ok(());
                }
            };

            if observe {
                for entry in locals.values().filter(|e| !e.is_dir) {
                    ctx.stale_conflicts.observe(&entry.path);
                }
            }

            let mut seen = HashSet::new();
            for child in &children {
                seen.insert(child.name.as_str());
                actions.control().checkpoint().await?;
                if !actions.admits(&child.name, Some(&child.path), report) {
                    continue;
                }
                let local_path = match local_dir.join(&child.name) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(name = %child.name, error = %e, "Skipping unrepresentable name");
                        report.skipped += 1;
                        continue;
                    }
                };
                self.reconcile_child(child, &local_path, locals.get(&child.name), depth, observe, report)
                    .await?;
            }

            let mut local_only: Vec<&LocalEntry> = locals
                .values()
                .filter(|e| !seen.contains(e.name.as_str()))
                .collect();
            local_only.sort_by(|a, b| a.name.cmp(&b.name));
            for entry in local_only {
                actions.control().checkpoint().await?;
                let Ok(remote_path) = remote.path.join(&entry.name) else {
                    warn!(name = %entry.name, "Name cannot be represented remotely, skipping");
                    report.skipped += 1;
                    continue;
                };
                if !actions.admits(&entry.name, Some(&remote_path), report) {
                    continue;
                }
                self.reconcile_local_only(entry, remote, report).await?;
            }
            Ok(())
        })
    }

    async fn reconcile_child(
        &self,
        child: &RemoteObject,
        local_path: &SyncPath,
        local: Option<&LocalEntry>,
        depth: Depth,
        observe: bool,
        report: &mut PassReport,
    ) -> Result<(), SyncError> {
        let actions = &self.actions;
        let bidirectional = actions.context().settings.bidirectional;
        let record = match actions.record(local_path).await {
            Ok(record) => record,
            Err(e) => {
                return actions
                    .settle(report, local_path, OperationKind::Metadata, Err(e))
                    .await;
            }
        };

        match (child.is_folder(), local) {
            (true, Some(entry)) if entry.is_dir => {
                actions.adopt_folder(child, local_path, report).await?;
                if depth == Depth::Recursive {
                    self.walk(child, local_path, depth, observe, report).await?;
                }
                Ok(())
            }
            (true, None) => match record {
                Some(record) if bidirectional => {
                    debug!(path = %local_path, "Folder deleted locally");
                    actions.delete_remote(&record, report).await
                }
                _ => actions.download_folder(child, local_path, report).await,
            },
            (false, Some(entry)) if !entry.is_dir => {
                actions
                    .reconcile_file(child, local_path, record, report)
                    .await
            }
            (false, None) => match record {
                Some(record)
                    if bidirectional && !record.remote_changed_since_sync(child.last_modified) =>
                {
                    debug!(path = %local_path, "File deleted locally");
                    actions.delete_remote(&record, report).await
                }
                Some(_) => {
                    debug!(path = %local_path, "Restoring file changed remotely");
                    actions.download_file(child, local_path, report).await
                }
                None => actions.download_file(child, local_path, report).await,
            },
            (_, Some(_)) => {
                warn!(
                    path = %local_path,
                    remote_is_folder = child.is_folder(),
                    "Folder on one side, file on the other, skipping"
                );
                report.skipped += 1;
                Ok(())
            }
        }
    }

    async fn reconcile_local_only(
        &self,
        entry: &LocalEntry,
        parent: &RemoteObject,
        report: &mut PassReport,
    ) -> Result<(), SyncError> {
        let actions = &self.actions;
        let bidirectional = actions.context().settings.bidirectional;
        let record = match actions.record(&entry.path).await {
            Ok(record) => record,
            Err(e) => {
                return actions
                    .settle(report, &entry.path, OperationKind::Metadata, Err(e))
                    .await;
            }
        };

        if let Some(record) = record {
            debug!(path = %entry.path, "Deleted remotely");
            if actions.delete_local(&record, report).await? || !bidirectional {
                return Ok(());
            }
            // Local edits survived; they come back as a new item.
            match actions.record(&entry.path).await {
                Ok(None) => {}
                Ok(Some(_)) => return Ok(()),
                Err(e) => {
                    return actions
                        .settle(report, &entry.path, OperationKind::Metadata, Err(e))
                        .await;
                }
            }
        } else if !bidirectional {
            debug!(path = %entry.path, "New local item left alone in download-only mode");
            return Ok(());
        }

        if entry.is_dir {
            actions.upload_folder(&entry.path, &parent.id, report).await
        } else {
            actions.upload_new_file(&entry.path, &parent.id, report).await
        }
    }
}
