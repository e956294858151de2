//! InMemoryRepository - an in-process IRemoteRepository
//!
//! Keeps a tree of documents and folders with stable ids, a change feed
//! with opaque numeric tokens, and a clock that advances by one second on
//! every mutation so modification timestamps are strictly increasing.
//!
//! ## Design Notes
//!
//! - State lives behind a `std::sync::Mutex`; no lock is held across an
//!   `.await`.
//! - Test helpers (`put_file`, `remove`, ...) act like another client
//!   editing the repository: they bypass fault injection and the call
//!   journal but do feed the change log.
//! - The journal records every mutating port call, so tests can assert
//!   that a pass had no remote side effects.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::debug;

use docsync_core::domain::{
    change::{ChangePage, RemoteChangeEvent, RemoteChangeType},
    newtypes::{ChangeToken, FileHash, RemoteId, RemotePath},
    remote::{ObjectKind, ObjectProperties, RemoteObject},
};
use docsync_core::ports::{IRemoteRepository, RemoteError, RemoteResult, RepositoryCapabilities};

use crate::content_hash;

/// Port operations that faults can be injected into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    GetObject,
    GetChildren,
    GetContent,
    GetChanges,
    CreateDocument,
    CreateFolder,
    SetContent,
    Move,
    UpdateProperties,
    DeleteTree,
    DeleteDocument,
}

#[derive(Debug, Clone)]
struct Fault {
    op: RemoteOp,
    path: Option<RemotePath>,
    error: RemoteError,
    remaining: Option<u32>,
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    kind: ObjectKind,
    parent: Option<RemoteId>,
    content: Vec<u8>,
    hash: Option<FileHash>,
    last_modified: DateTime<Utc>,
    last_modified_by: Option<String>,
}

#[derive(Debug)]
struct Inner {
    nodes: HashMap<RemoteId, Node>,
    root: RemoteId,
    next_id: u64,
    clock: DateTime<Utc>,
    editor: String,
    changes: Vec<(u64, RemoteId, RemoteChangeType)>,
    seq: u64,
    truncated_through: Option<u64>,
    faults: Vec<Fault>,
    journal: Vec<String>,
    downloads: u64,
    capabilities: RepositoryCapabilities,
}

fn runtime(e: impl std::fmt::Display) -> RemoteError {
    RemoteError::Runtime(e.to_string())
}

impl Inner {
    fn new() -> Self {
        let clock = Utc
            .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        let root = RemoteId::new("root".to_string()).unwrap_or_else(|_| unreachable!());
        let mut nodes = HashMap::new();
        nodes.insert(
            root.clone(),
            Node {
                name: String::new(),
                kind: ObjectKind::Folder,
                parent: None,
                content: Vec::new(),
                hash: None,
                last_modified: clock,
                last_modified_by: None,
            },
        );
        Self {
            nodes,
            root,
            next_id: 1,
            clock,
            editor: "remote-user".to_string(),
            changes: Vec::new(),
            seq: 0,
            truncated_through: None,
            faults: Vec::new(),
            journal: Vec::new(),
            downloads: 0,
            capabilities: RepositoryCapabilities {
                supports_change_log: true,
                max_change_items: None,
            },
        }
    }

    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += Duration::seconds(1);
        self.clock
    }

    fn record(&mut self, id: &RemoteId, change_type: RemoteChangeType) {
        self.seq += 1;
        self.changes.push((self.seq, id.clone(), change_type));
    }

    fn node(&self, id: &RemoteId) -> RemoteResult<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    fn path_of(&self, id: &RemoteId) -> RemoteResult<RemotePath> {
        let mut names = Vec::new();
        let mut current = id.clone();
        loop {
            let node = self.node(&current)?;
            match &node.parent {
                Some(parent) => {
                    names.push(node.name.clone());
                    current = parent.clone();
                }
                None => break,
            }
        }
        names.reverse();
        RemotePath::root()
            .join_relative(&names.join("/"))
            .map_err(runtime)
    }

    fn snapshot(&self, id: &RemoteId) -> RemoteResult<RemoteObject> {
        let node = self.node(id)?;
        Ok(RemoteObject {
            id: id.clone(),
            name: node.name.clone(),
            path: self.path_of(id)?,
            kind: node.kind,
            parent_id: node.parent.clone(),
            last_modified: node.last_modified,
            last_modified_by: node.last_modified_by.clone(),
            content_hash: node.hash.clone(),
            size: node.content.len() as u64,
        })
    }

    fn children_of(&self, parent: &RemoteId) -> Vec<RemoteId> {
        let mut children: Vec<(&String, &RemoteId)> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.parent.as_ref() == Some(parent))
            .map(|(id, n)| (&n.name, id))
            .collect();
        children.sort();
        children.into_iter().map(|(_, id)| id.clone()).collect()
    }

    fn find_child(&self, parent: &RemoteId, name: &str) -> Option<RemoteId> {
        self.nodes
            .iter()
            .find(|(_, n)| n.parent.as_ref() == Some(parent) && n.name == name)
            .map(|(id, _)| id.clone())
    }

    fn resolve(&self, path: &RemotePath) -> Option<RemoteId> {
        let relative = path.strip_prefix(&RemotePath::root())?;
        relative
            .split('/')
            .filter(|seg| !seg.is_empty())
            .try_fold(self.root.clone(), |id, name| self.find_child(&id, name))
    }

    /// Post-order listing of `id` and everything below it
    fn subtree(&self, id: &RemoteId) -> Vec<RemoteId> {
        let mut out = Vec::new();
        for child in self.children_of(id) {
            out.extend(self.subtree(&child));
        }
        out.push(id.clone());
        out
    }

    fn check_fault(&mut self, op: RemoteOp, path: &RemotePath) -> RemoteResult<()> {
        let hit = self.faults.iter().position(|f| {
            f.op == op && f.path.as_ref().map_or(true, |p| path.starts_with(p))
        });
        let Some(index) = hit else {
            return Ok(());
        };

        let error = self.faults[index].error.clone();
        if let Some(remaining) = self.faults[index].remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                self.faults.remove(index);
            }
        }
        debug!(?op, path = %path, error = %error, "Injected repository fault");
        Err(error)
    }

    fn validate_name(&self, parent: &RemoteId, name: &str) -> RemoteResult<()> {
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(RemoteError::NameConstraintViolation(name.to_string()));
        }
        if self.find_child(parent, name).is_some() {
            return Err(RemoteError::NameConstraintViolation(format!(
                "{name} already exists"
            )));
        }
        Ok(())
    }

    fn insert(
        &mut self,
        parent: &RemoteId,
        name: &str,
        kind: ObjectKind,
        content: &[u8],
    ) -> RemoteResult<RemoteId> {
        if self.node(parent)?.kind != ObjectKind::Folder {
            return Err(runtime(format!("{parent} is not a folder")));
        }
        self.validate_name(parent, name)?;

        let id = RemoteId::new(format!("obj-{}", self.next_id)).map_err(runtime)?;
        self.next_id += 1;
        let now = self.tick();
        let hash = match kind {
            ObjectKind::Document => content_hash(content),
            ObjectKind::Folder => None,
        };
        self.nodes.insert(
            id.clone(),
            Node {
                name: name.to_string(),
                kind,
                parent: Some(parent.clone()),
                content: content.to_vec(),
                hash,
                last_modified: now,
                last_modified_by: Some(self.editor.clone()),
            },
        );
        self.record(&id, RemoteChangeType::Created);
        Ok(id)
    }

    fn write_content(&mut self, id: &RemoteId, content: &[u8]) -> RemoteResult<()> {
        let now = self.tick();
        let editor = self.editor.clone();
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        if node.kind != ObjectKind::Document {
            return Err(runtime(format!("{id} is not a document")));
        }
        node.content = content.to_vec();
        node.hash = content_hash(content);
        node.last_modified = now;
        node.last_modified_by = Some(editor);
        self.record(id, RemoteChangeType::Updated);
        Ok(())
    }

    fn touch(&mut self, id: &RemoteId) -> RemoteResult<()> {
        let now = self.tick();
        let editor = self.editor.clone();
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        node.last_modified = now;
        node.last_modified_by = Some(editor);
        self.record(id, RemoteChangeType::Updated);
        Ok(())
    }

    fn mkdirs(&mut self, path: &RemotePath) -> RemoteResult<RemoteId> {
        let relative = path
            .strip_prefix(&RemotePath::root())
            .unwrap_or_default()
            .to_string();
        let mut current = self.root.clone();
        for name in relative.split('/').filter(|s| !s.is_empty()) {
            current = match self.find_child(&current, name) {
                Some(id) => id,
                None => self.insert(&current, name, ObjectKind::Folder, &[])?,
            };
        }
        Ok(current)
    }

    fn delete_ids(&mut self, ids: &[RemoteId]) {
        for id in ids {
            if self.nodes.remove(id).is_some() {
                self.record(id, RemoteChangeType::Deleted);
            }
        }
    }
}

/// In-process repository implementing `IRemoteRepository`
#[derive(Debug)]
pub struct InMemoryRepository {
    inner: Mutex<Inner>,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn parse(path: &str) -> RemoteResult<RemotePath> {
    RemotePath::new(path.to_string()).map_err(runtime)
}

impl InMemoryRepository {
    /// Creates an empty repository with change-feed support
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Replaces the advertised capabilities
    pub fn with_capabilities(self, capabilities: RepositoryCapabilities) -> Self {
        if let Ok(mut inner) = self.inner.lock() {
            inner.capabilities = capabilities;
        }
        self
    }

    fn lock(&self) -> RemoteResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| runtime("repository state poisoned"))
    }

    // ------------------------------------------------------------------
    // Helpers acting as another client of the repository
    // ------------------------------------------------------------------

    /// Identity recorded as the last editor of subsequent changes
    pub fn set_editor(&self, editor: impl Into<String>) {
        if let Ok(mut inner) = self.lock() {
            inner.editor = editor.into();
        }
    }

    /// Creates or overwrites a document, creating parent folders
    pub fn put_file(&self, path: &str, content: &[u8]) -> RemoteResult<RemoteObject> {
        let path = parse(path)?;
        let mut inner = self.lock()?;
        let id = match inner.resolve(&path) {
            Some(id) => {
                inner.write_content(&id, content)?;
                id
            }
            None => {
                let parent = path.parent().ok_or_else(|| runtime("cannot write root"))?;
                let name = path.file_name().unwrap_or_default().to_string();
                let parent_id = inner.mkdirs(&parent)?;
                inner.insert(&parent_id, &name, ObjectKind::Document, content)?
            }
        };
        inner.snapshot(&id)
    }

    /// Creates a folder and its parents
    pub fn put_folder(&self, path: &str) -> RemoteResult<RemoteObject> {
        let path = parse(path)?;
        let mut inner = self.lock()?;
        let id = inner.mkdirs(&path)?;
        inner.snapshot(&id)
    }

    /// Deletes the object at `path` with everything below it
    pub fn remove(&self, path: &str) -> RemoteResult<()> {
        let path = parse(path)?;
        let mut inner = self.lock()?;
        let id = inner
            .resolve(&path)
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))?;
        let ids = inner.subtree(&id);
        inner.delete_ids(&ids);
        Ok(())
    }

    /// Renames the object at `path` within its folder
    pub fn rename_at(&self, path: &str, new_name: &str) -> RemoteResult<RemoteObject> {
        let path = parse(path)?;
        let mut inner = self.lock()?;
        let id = inner
            .resolve(&path)
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))?;
        let parent = inner
            .node(&id)?
            .parent
            .clone()
            .ok_or_else(|| runtime("cannot rename root"))?;
        inner.validate_name(&parent, new_name)?;
        if let Some(node) = inner.nodes.get_mut(&id) {
            node.name = new_name.to_string();
        }
        inner.touch(&id)?;
        inner.snapshot(&id)
    }

    /// Moves the object at `path` into the folder at `new_parent`
    pub fn move_to(&self, path: &str, new_parent: &str) -> RemoteResult<RemoteObject> {
        let path = parse(path)?;
        let new_parent = parse(new_parent)?;
        let mut inner = self.lock()?;
        let id = inner
            .resolve(&path)
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))?;
        let target = inner.mkdirs(&new_parent)?;
        let name = inner.node(&id)?.name.clone();
        inner.validate_name(&target, &name)?;
        if let Some(node) = inner.nodes.get_mut(&id) {
            node.parent = Some(target);
        }
        inner.touch(&id)?;
        inner.snapshot(&id)
    }

    /// Emits a `Security` change for the object at `path` without modifying it
    pub fn touch_security(&self, path: &str) -> RemoteResult<()> {
        let path = parse(path)?;
        let mut inner = self.lock()?;
        let id = inner
            .resolve(&path)
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))?;
        inner.record(&id, RemoteChangeType::Security);
        Ok(())
    }

    /// Drops every change recorded so far; older tokens become unusable
    pub fn truncate_change_log(&self) {
        if let Ok(mut inner) = self.lock() {
            inner.changes.clear();
            inner.truncated_through = Some(inner.seq);
        }
    }

    /// Makes `op` fail with `error` for objects at or below `path`
    ///
    /// `times = None` keeps the fault until [`clear_faults`](Self::clear_faults).
    pub fn inject_fault(
        &self,
        op: RemoteOp,
        path: Option<&str>,
        error: RemoteError,
        times: Option<u32>,
    ) {
        let path = path.and_then(|p| RemotePath::new(p.to_string()).ok());
        if let Ok(mut inner) = self.lock() {
            inner.faults.push(Fault {
                op,
                path,
                error,
                remaining: times,
            });
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut inner) = self.lock() {
            inner.faults.clear();
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn object_at(&self, path: &str) -> Option<RemoteObject> {
        let path = RemotePath::new(path.to_string()).ok()?;
        let inner = self.lock().ok()?;
        let id = inner.resolve(&path)?;
        inner.snapshot(&id).ok()
    }

    pub fn content_at(&self, path: &str) -> Option<Vec<u8>> {
        let path = RemotePath::new(path.to_string()).ok()?;
        let inner = self.lock().ok()?;
        let id = inner.resolve(&path)?;
        inner.nodes.get(&id).map(|n| n.content.clone())
    }

    pub fn exists(&self, path: &str) -> bool {
        self.object_at(path).is_some()
    }

    /// Every path in the repository except the root, sorted
    pub fn paths(&self) -> Vec<String> {
        let Ok(inner) = self.lock() else {
            return Vec::new();
        };
        let mut paths: Vec<String> = inner
            .nodes
            .keys()
            .filter(|id| **id != inner.root)
            .filter_map(|id| inner.path_of(id).ok())
            .map(|p| p.to_string())
            .collect();
        paths.sort();
        paths
    }

    /// Mutating port calls made so far, e.g. `create_document /docs/a.txt`
    pub fn journal(&self) -> Vec<String> {
        self.lock().map(|i| i.journal.clone()).unwrap_or_default()
    }

    pub fn clear_journal(&self) {
        if let Ok(mut inner) = self.lock() {
            inner.journal.clear();
            inner.downloads = 0;
        }
    }

    /// Number of `get_content_stream` calls since the journal was cleared
    pub fn downloads(&self) -> u64 {
        self.lock().map(|i| i.downloads).unwrap_or(0)
    }

    /// Current head of the change log
    pub fn latest_sequence(&self) -> u64 {
        self.lock().map(|i| i.seq).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl IRemoteRepository for InMemoryRepository {
    fn capabilities(&self) -> RepositoryCapabilities {
        self.lock().map(|i| i.capabilities).unwrap_or_default()
    }

    async fn get_object_by_path(&self, path: &RemotePath) -> RemoteResult<RemoteObject> {
        let mut inner = self.lock()?;
        inner.check_fault(RemoteOp::GetObject, path)?;
        let id = inner
            .resolve(path)
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))?;
        inner.snapshot(&id)
    }

    async fn get_object(&self, id: &RemoteId) -> RemoteResult<RemoteObject> {
        let mut inner = self.lock()?;
        let path = inner.path_of(id)?;
        inner.check_fault(RemoteOp::GetObject, &path)?;
        inner.snapshot(id)
    }

    async fn get_children(&self, folder: &RemoteId) -> RemoteResult<Vec<RemoteObject>> {
        let mut inner = self.lock()?;
        let path = inner.path_of(folder)?;
        inner.check_fault(RemoteOp::GetChildren, &path)?;
        if inner.node(folder)?.kind != ObjectKind::Folder {
            return Err(runtime(format!("{folder} is not a folder")));
        }
        inner
            .children_of(folder)
            .iter()
            .map(|id| inner.snapshot(id))
            .collect()
    }

    async fn get_content_stream(&self, document: &RemoteId) -> RemoteResult<Vec<u8>> {
        let mut inner = self.lock()?;
        let path = inner.path_of(document)?;
        inner.check_fault(RemoteOp::GetContent, &path)?;
        inner.downloads += 1;
        Ok(inner.node(document)?.content.clone())
    }

    async fn get_content_changes(
        &self,
        token: &ChangeToken,
        include_properties: bool,
        max_items: u32,
    ) -> RemoteResult<ChangePage> {
        let mut inner = self.lock()?;
        if !inner.capabilities.supports_change_log {
            return Err(runtime("change log not supported"));
        }
        inner.check_fault(RemoteOp::GetChanges, &RemotePath::root())?;

        let after: u64 = token
            .as_str()
            .parse()
            .map_err(|_| runtime(format!("invalid change token {token}")))?;
        if after > inner.seq {
            return Err(runtime(format!("unknown change token {token}")));
        }
        if inner.truncated_through.is_some_and(|t| after < t) {
            return Err(runtime(format!("change token {token} is no longer available")));
        }

        let cap = inner
            .capabilities
            .max_change_items
            .map_or(max_items, |c| c.min(max_items))
            .max(1) as usize;
        let pending: Vec<(u64, RemoteId, RemoteChangeType)> = inner
            .changes
            .iter()
            .filter(|(seq, _, _)| *seq > after)
            .cloned()
            .collect();
        let has_more = pending.len() > cap;
        let page: Vec<_> = pending.into_iter().take(cap).collect();
        let last = page.last().map_or(after, |(seq, _, _)| *seq);

        let events = page
            .into_iter()
            .map(|(_, id, change_type)| {
                let mut event = RemoteChangeEvent::new(id.clone(), change_type);
                if include_properties {
                    event.properties = inner.snapshot(&id).ok();
                }
                event
            })
            .collect();

        Ok(ChangePage {
            events,
            next_token: ChangeToken::new(last.to_string()).map_err(runtime)?,
            has_more,
        })
    }

    async fn get_latest_change_token(&self) -> RemoteResult<Option<ChangeToken>> {
        let inner = self.lock()?;
        if !inner.capabilities.supports_change_log {
            return Err(runtime("change log not supported"));
        }
        Ok(Some(
            ChangeToken::new(inner.seq.to_string()).map_err(runtime)?,
        ))
    }

    async fn create_document(
        &self,
        parent: &RemoteId,
        name: &str,
        content: &[u8],
    ) -> RemoteResult<RemoteObject> {
        let mut inner = self.lock()?;
        let path = inner.path_of(parent)?.join(name).map_err(|_| {
            RemoteError::NameConstraintViolation(name.to_string())
        })?;
        inner.check_fault(RemoteOp::CreateDocument, &path)?;
        let id = inner.insert(parent, name, ObjectKind::Document, content)?;
        inner.journal.push(format!("create_document {path}"));
        inner.snapshot(&id)
    }

    async fn create_folder(&self, parent: &RemoteId, name: &str) -> RemoteResult<RemoteObject> {
        let mut inner = self.lock()?;
        let path = inner.path_of(parent)?.join(name).map_err(|_| {
            RemoteError::NameConstraintViolation(name.to_string())
        })?;
        inner.check_fault(RemoteOp::CreateFolder, &path)?;
        let id = inner.insert(parent, name, ObjectKind::Folder, &[])?;
        inner.journal.push(format!("create_folder {path}"));
        inner.snapshot(&id)
    }

    async fn set_content_stream(
        &self,
        document: &RemoteId,
        content: &[u8],
    ) -> RemoteResult<RemoteObject> {
        let mut inner = self.lock()?;
        let path = inner.path_of(document)?;
        inner.check_fault(RemoteOp::SetContent, &path)?;
        inner.write_content(document, content)?;
        inner.journal.push(format!("set_content_stream {path}"));
        inner.snapshot(document)
    }

    async fn move_object(
        &self,
        object: &RemoteId,
        source_folder: &RemoteId,
        target_folder: &RemoteId,
    ) -> RemoteResult<RemoteObject> {
        let mut inner = self.lock()?;
        let path = inner.path_of(object)?;
        inner.check_fault(RemoteOp::Move, &path)?;

        if inner.node(object)?.parent.as_ref() != Some(source_folder) {
            return Err(runtime(format!("{object} is not in folder {source_folder}")));
        }
        if inner.node(target_folder)?.kind != ObjectKind::Folder {
            return Err(runtime(format!("{target_folder} is not a folder")));
        }
        if inner.subtree(object).contains(target_folder) {
            return Err(runtime("cannot move a folder into itself"));
        }
        let name = inner.node(object)?.name.clone();
        inner.validate_name(target_folder, &name)?;

        if let Some(node) = inner.nodes.get_mut(object) {
            node.parent = Some(target_folder.clone());
        }
        inner.touch(object)?;
        let target_path = inner.path_of(target_folder)?;
        inner.journal.push(format!("move_object {path} -> {target_path}"));
        inner.snapshot(object)
    }

    async fn update_properties(
        &self,
        object: &RemoteId,
        properties: &ObjectProperties,
    ) -> RemoteResult<RemoteObject> {
        let mut inner = self.lock()?;
        let path = inner.path_of(object)?;
        inner.check_fault(RemoteOp::UpdateProperties, &path)?;

        if let Some(name) = &properties.name {
            let parent = inner
                .node(object)?
                .parent
                .clone()
                .ok_or_else(|| runtime("cannot rename root"))?;
            if inner.node(object)?.name != *name {
                inner.validate_name(&parent, name)?;
            }
            if let Some(node) = inner.nodes.get_mut(object) {
                node.name = name.clone();
            }
            inner.journal.push(format!("update_properties {path} -> {name}"));
        }
        inner.touch(object)?;
        inner.snapshot(object)
    }

    async fn delete_tree(
        &self,
        folder: &RemoteId,
        continue_on_failure: bool,
    ) -> RemoteResult<Vec<RemoteId>> {
        let mut inner = self.lock()?;
        let path = inner.path_of(folder)?;
        inner.check_fault(RemoteOp::DeleteTree, &path)?;
        if inner.node(folder)?.kind != ObjectKind::Folder {
            return Err(runtime(format!("{folder} is not a folder")));
        }

        // Children come before their parents; a parent survives when any
        // descendant could not be deleted.
        let mut failed: Vec<RemoteId> = Vec::new();
        let mut blocked: HashSet<RemoteId> = HashSet::new();
        let mut deletable = Vec::new();
        for id in inner.subtree(folder) {
            let child_path = inner.path_of(&id)?;
            let refused = inner.check_fault(RemoteOp::DeleteDocument, &child_path).err();
            if let Some(error) = refused {
                if !continue_on_failure {
                    return Err(error);
                }
                failed.push(id.clone());
            }
            if failed.contains(&id) || blocked.contains(&id) {
                if let Some(parent) = inner.node(&id)?.parent.clone() {
                    blocked.insert(parent);
                }
                continue;
            }
            deletable.push(id);
        }
        inner.delete_ids(&deletable);
        inner.journal.push(format!("delete_tree {path}"));
        Ok(failed)
    }

    async fn delete_all_versions(&self, document: &RemoteId) -> RemoteResult<()> {
        let mut inner = self.lock()?;
        let path = inner.path_of(document)?;
        inner.check_fault(RemoteOp::DeleteDocument, &path)?;
        if inner.node(document)?.kind != ObjectKind::Document {
            return Err(runtime(format!("{document} is not a document")));
        }
        inner.delete_ids(std::slice::from_ref(document));
        inner.journal.push(format!("delete_all_versions {path}"));
        Ok(())
    }
}
