//! Incremental reconciliation driven by the repository change feed
//!
//! ## Flow
//!
//! 1. Without a stored token, crawl everything and adopt the server token
//!    read *before* the crawl started, so nothing changed during the crawl
//!    is skipped.
//! 2. If the stored token equals the server token, there is nothing to do.
//! 3. Otherwise page through the feed. Each page is reduced to a set of
//!    folders: the current parent of every object that still exists, and
//!    the last known parent of every object that is gone. Each folder is
//!    crawled one level deep, once per page.
//! 4. The stored token advances after every fully applied page. A failed
//!    page stops the loop and leaves the token where it was.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use docsync_core::domain::{
    ChangePage, ExceptionKind, OperationKind, RemoteId, RemoteObject, RemotePath, SyncItem,
};

use crate::{
    actions::{exception_kind, ItemActions},
    crawl::{CrawlReconciler, Depth},
    report::PassReport,
    SyncError,
};

pub struct ChangeLogReconciler {
    actions: Arc<ItemActions>,
    crawl: Arc<CrawlReconciler>,
}

impl ChangeLogReconciler {
    pub fn new(actions: Arc<ItemActions>, crawl: Arc<CrawlReconciler>) -> Self {
        Self { actions, crawl }
    }

    /// Crawls the whole tree and, on success, stores the server token
    #[instrument(skip(self))]
    pub async fn crawl_and_adopt_token(&self) -> Result<PassReport, SyncError> {
        let ctx = self.actions.context();
        let server_token = if ctx.remote.capabilities().supports_change_log {
            match ctx.remote.get_latest_change_token().await {
                Ok(token) => token,
                Err(e) => {
                    warn!(error = %e, "Could not read the change token");
                    let mut report = PassReport::new();
                    report.fail(exception_kind(&e), format!("change token: {e}"));
                    return Ok(report);
                }
            }
        } else {
            None
        };

        let mut report = self.crawl.reconcile().await?;
        if let (true, Some(token)) = (report.success(), server_token) {
            match ctx.state.set_change_token(&token).await {
                Ok(()) => info!(token = %token, "Change token adopted after crawl"),
                Err(e) => report.fail(ExceptionKind::StateStore, format!("change token: {e}")),
            }
        }
        Ok(report)
    }

    /// Applies the changes recorded since the stored token
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<PassReport, SyncError> {
        let ctx = self.actions.context();
        let capabilities = ctx.remote.capabilities();
        if !capabilities.supports_change_log {
            debug!("No change feed, crawling instead");
            return self.crawl_and_adopt_token().await;
        }

        let mut report = PassReport::new();
        let client_token = match ctx.state.get_change_token().await {
            Ok(token) => token,
            Err(e) => {
                report.fail(ExceptionKind::StateStore, format!("change token: {e}"));
                return Ok(report);
            }
        };
        let Some(mut token) = client_token else {
            info!("No stored change token, starting with a crawl");
            return self.crawl_and_adopt_token().await;
        };

        let server_token = match ctx.remote.get_latest_change_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Could not read the change token");
                report.fail(exception_kind(&e), format!("change token: {e}"));
                return Ok(report);
            }
        };
        if server_token.as_ref() == Some(&token) {
            debug!(token = %token, "No remote changes");
            return Ok(report);
        }

        let batch = capabilities
            .max_change_items
            .map_or(ctx.settings.change_batch_size, |cap| {
                cap.min(ctx.settings.change_batch_size)
            })
            .max(1);

        loop {
            self.actions.control().checkpoint().await?;
            let page = match ctx.remote.get_content_changes(&token, true, batch).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(token = %token, error = %e, "Change feed unavailable");
                    report.fail(exception_kind(&e), format!("change feed: {e}"));
                    break;
                }
            };

            let mut page_report = PassReport::new();
            self.apply_page(&page, &mut page_report).await?;
            let applied = page_report.success();
            report.merge(page_report);
            if !applied {
                warn!(token = %token, "Change page not fully applied, token kept");
                break;
            }

            if let Err(e) = ctx.state.set_change_token(&page.next_token).await {
                report.fail(ExceptionKind::StateStore, format!("change token: {e}"));
                break;
            }
            debug!(
                from = %token,
                to = %page.next_token,
                events = page.events.len(),
                "Change token advanced"
            );
            token = page.next_token.clone();
            if !page.has_more {
                break;
            }
        }
        Ok(report)
    }

    async fn apply_page(&self, page: &ChangePage, report: &mut PassReport) -> Result<(), SyncError> {
        let ctx = self.actions.context();
        let mut seen: HashSet<&RemoteId> = HashSet::new();
        let mut folders: Vec<RemotePath> = Vec::new();

        for event in &page.events {
            if !seen.insert(&event.object_id) {
                continue;
            }
            self.actions.control().checkpoint().await?;
            debug!(object = %event.object_id, change = %event.change_type, "Remote change");

            match ctx.remote.get_object(&event.object_id).await {
                Ok(object) => self.on_present(&object, &mut folders, report).await?,
                Err(e) if e.is_not_found() => self.on_gone(&event.object_id, &mut folders, report).await,
                Err(e) => {
                    warn!(object = %event.object_id, error = %e, "Could not resolve changed object");
                    report.fail(exception_kind(&e), format!("{}: {e}", event.object_id));
                }
            }
        }

        let mut crawled = HashSet::new();
        for folder in folders {
            self.actions.control().checkpoint().await?;
            self.crawl_nearest(folder, &mut crawled, report).await?;
        }
        Ok(())
    }

    async fn on_present(
        &self,
        object: &RemoteObject,
        folders: &mut Vec<RemotePath>,
        report: &mut PassReport,
    ) -> Result<(), SyncError> {
        let ctx = self.actions.context();
        let record = match self.actions.record_by_id(&object.id).await {
            Ok(record) => record,
            Err(e) => {
                report.fail(ExceptionKind::StateStore, e.to_string());
                return Ok(());
            }
        };

        if let Some(record) = &record {
            if record.remote_path() != &object.path {
                if ctx.in_scope(&object.path) {
                    self.follow_move(record, object, folders, report).await?;
                } else {
                    debug!(object = %object.id, path = %object.path, "Moved out of scope");
                    push_parent(folders, record.remote_path());
                }
            }
        }

        if !ctx.in_scope(&object.path) {
            return Ok(());
        }
        if object.path == ctx.settings.remote_root {
            push_unique(folders, object.path.clone());
        } else {
            push_parent(folders, &object.path);
        }
        Ok(())
    }

    /// Mirrors a remote move or rename of a known item locally
    ///
    /// Only done when the local copy is unchanged and the target is free;
    /// otherwise the old location is crawled as well, so the stale copy is
    /// handled as a remote deletion.
    async fn follow_move(
        &self,
        record: &SyncItem,
        object: &RemoteObject,
        folders: &mut Vec<RemotePath>,
        report: &mut PassReport,
    ) -> Result<(), SyncError> {
        let ctx = self.actions.context();
        let from = record.local_path();
        let to = ctx.local_path_for(&object.path)?;

        let source_exists = ctx.local.exists(from).await.unwrap_or(false);
        let target_exists = ctx.local.exists(&to).await.unwrap_or(true);
        let unchanged = record.is_folder()
            || self
                .actions
                .unchanged_since(from, record.local_checksum())
                .await;
        if !source_exists || target_exists || !unchanged {
            debug!(from = %from, to = %to, "Remote move not mirrored, crawling old location");
            push_parent(folders, record.remote_path());
            return Ok(());
        }

        let result: Result<(), SyncError> = async {
            ctx.local.rename(from, &to).await.map_err(SyncError::LocalFs)?;
            ctx.state
                .move_item(from, &to, &object.path)
                .await
                .map_err(SyncError::StateStore)?;
            let same_bytes = match (&object.content_hash, record.local_checksum()) {
                (Some(remote), Some(local)) => remote == local,
                _ => record.is_folder(),
            };
            if same_bytes {
                ctx.state
                    .set_remote_last_modified(&to, object.last_modified)
                    .await
                    .map_err(SyncError::StateStore)?;
            }
            Ok(())
        }
        .await;

        if result.is_ok() {
            info!(from = %from, to = %to, "Followed remote move");
            report.moves += 1;
        } else {
            push_parent(folders, record.remote_path());
        }
        self.actions
            .settle(report, from, OperationKind::Metadata, result)
            .await
    }

    async fn on_gone(&self, id: &RemoteId, folders: &mut Vec<RemotePath>, report: &mut PassReport) {
        match self.actions.record_by_id(id).await {
            Ok(Some(record)) => {
                debug!(object = %id, path = %record.remote_path(), "Known object deleted");
                push_parent(folders, record.remote_path());
            }
            Ok(None) => debug!(object = %id, "Unknown object deleted, ignoring"),
            Err(e) => report.fail(ExceptionKind::StateStore, e.to_string()),
        }
    }

    /// Crawls `folder`, or its nearest ancestor that exists on both sides
    async fn crawl_nearest(
        &self,
        folder: RemotePath,
        crawled: &mut HashSet<RemotePath>,
        report: &mut PassReport,
    ) -> Result<(), SyncError> {
        let ctx = self.actions.context();
        let root = &ctx.settings.remote_root;
        let mut path = if folder.starts_with(root) {
            folder
        } else {
            root.clone()
        };

        loop {
            if crawled.contains(&path) {
                return Ok(());
            }
            let at_root = &path == root;
            let found = match ctx.remote.get_object_by_path(&path).await {
                Ok(object) if object.is_folder() => {
                    let local = ctx.local_path_for(&path)?;
                    let local_exists = ctx.local.exists(&local).await.unwrap_or(false);
                    (local_exists || at_root).then_some(object)
                }
                Ok(_) => None,
                Err(e) if e.is_not_found() && !at_root => None,
                Err(e) => {
                    report.fail(exception_kind(&e), format!("{path}: {e}"));
                    return Ok(());
                }
            };

            if let Some(object) = found {
                crawled.insert(path);
                return self
                    .crawl
                    .reconcile_folder(&object, Depth::Shallow, report)
                    .await;
            }
            if at_root {
                report.fail(ExceptionKind::Unexpected, format!("remote root {path} unavailable"));
                return Ok(());
            }
            debug!(path = %path, "Folder missing on one side, climbing up");
            path = path.parent().unwrap_or_else(|| root.clone());
        }
    }
}

fn push_unique(folders: &mut Vec<RemotePath>, path: RemotePath) {
    if !folders.contains(&path) {
        folders.push(path);
    }
}

fn push_parent(folders: &mut Vec<RemotePath>, path: &RemotePath) {
    if let Some(parent) = path.parent() {
        push_unique(folders, parent);
    }
}
