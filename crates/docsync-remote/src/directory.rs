//! DirectoryRepository - a repository rooted at a local directory
//!
//! Treats a directory (typically a mounted network share) as the remote
//! repository. Object ids are handed out per relative path and follow
//! objects across moves made through this adapter. There is no change
//! feed, so the orchestrator always reconciles by crawling.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::debug;

use docsync_core::domain::{
    change::ChangePage,
    newtypes::{ChangeToken, RemoteId, RemotePath},
    remote::{ObjectKind, ObjectProperties, RemoteObject},
};
use docsync_core::ports::{IRemoteRepository, RemoteError, RemoteResult, RepositoryCapabilities};

use crate::content_hash;

#[derive(Debug, Default)]
struct Ids {
    by_path: HashMap<String, RemoteId>,
    by_id: HashMap<RemoteId, String>,
    next: u64,
}

/// `IRemoteRepository` backed by a directory tree
#[derive(Debug)]
pub struct DirectoryRepository {
    root: PathBuf,
    ids: Mutex<Ids>,
}

fn io_error(context: &str, e: std::io::Error) -> RemoteError {
    match e.kind() {
        std::io::ErrorKind::NotFound => RemoteError::NotFound(context.to_string()),
        std::io::ErrorKind::PermissionDenied => RemoteError::PermissionDenied(context.to_string()),
        std::io::ErrorKind::AlreadyExists => {
            RemoteError::NameConstraintViolation(format!("{context} already exists"))
        }
        _ => RemoteError::Runtime(format!("{context}: {e}")),
    }
}

fn check_name(name: &str) -> RemoteResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(RemoteError::NameConstraintViolation(name.to_string()));
    }
    Ok(())
}

impl DirectoryRepository {
    /// Opens a repository rooted at `root`, which must be an existing directory
    pub fn new(root: impl Into<PathBuf>) -> RemoteResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(RemoteError::NotFound(format!(
                "repository root {} is not a directory",
                root.display()
            )));
        }
        let repo = Self {
            root,
            ids: Mutex::new(Ids::default()),
        };
        repo.id_for("")?;
        Ok(repo)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock(&self) -> RemoteResult<std::sync::MutexGuard<'_, Ids>> {
        self.ids
            .lock()
            .map_err(|_| RemoteError::Runtime("id table poisoned".to_string()))
    }

    /// Stable id for a relative path, assigning one on first sight
    fn id_for(&self, relative: &str) -> RemoteResult<RemoteId> {
        let mut ids = self.lock()?;
        if let Some(id) = ids.by_path.get(relative) {
            return Ok(id.clone());
        }
        ids.next += 1;
        let id = RemoteId::new(format!("dir-{}", ids.next))
            .map_err(|e| RemoteError::Runtime(e.to_string()))?;
        ids.by_path.insert(relative.to_string(), id.clone());
        ids.by_id.insert(id.clone(), relative.to_string());
        Ok(id)
    }

    fn relative_of(&self, id: &RemoteId) -> RemoteResult<String> {
        self.lock()?
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    /// Re-keys every id at or below `from` to live under `to`
    fn rekey(&self, from: &str, to: &str) -> RemoteResult<()> {
        let mut ids = self.lock()?;
        let moved: Vec<(String, RemoteId)> = ids
            .by_path
            .iter()
            .filter(|(p, _)| *p == from || p.starts_with(&format!("{from}/")))
            .map(|(p, id)| (p.clone(), id.clone()))
            .collect();
        for (old, id) in moved {
            let new = format!("{to}{}", &old[from.len()..]);
            ids.by_path.remove(&old);
            ids.by_path.insert(new.clone(), id.clone());
            ids.by_id.insert(id, new);
        }
        Ok(())
    }

    fn forget(&self, relative: &str) -> RemoteResult<()> {
        let mut ids = self.lock()?;
        let gone: Vec<String> = ids
            .by_path
            .keys()
            .filter(|p| *p == relative || p.starts_with(&format!("{relative}/")))
            .cloned()
            .collect();
        for path in gone {
            if let Some(id) = ids.by_path.remove(&path) {
                ids.by_id.remove(&id);
            }
        }
        Ok(())
    }

    fn absolute(&self, relative: &str) -> PathBuf {
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }

    fn child_relative(parent: &str, name: &str) -> String {
        if parent.is_empty() {
            name.to_string()
        } else {
            format!("{parent}/{name}")
        }
    }

    async fn object_at(&self, relative: &str) -> RemoteResult<RemoteObject> {
        let abs = self.absolute(relative);
        let meta = tokio::fs::metadata(&abs)
            .await
            .map_err(|e| io_error(relative, e))?;
        let path = RemotePath::root()
            .join_relative(relative)
            .map_err(|e| RemoteError::Runtime(e.to_string()))?;
        let parent_id = match relative.rsplit_once('/') {
            Some((parent, _)) => Some(self.id_for(parent)?),
            None if relative.is_empty() => None,
            None => Some(self.id_for("")?),
        };
        let last_modified: DateTime<Utc> = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        let (kind, content_hash, size) = if meta.is_dir() {
            (ObjectKind::Folder, None, 0)
        } else {
            let data = tokio::fs::read(&abs)
                .await
                .map_err(|e| io_error(relative, e))?;
            (ObjectKind::Document, content_hash(&data), meta.len())
        };

        Ok(RemoteObject {
            id: self.id_for(relative)?,
            name: path.file_name().unwrap_or_default().to_string(),
            path,
            kind,
            parent_id,
            last_modified,
            last_modified_by: None,
            content_hash,
            size,
        })
    }

    async fn write_atomic(&self, relative: &str, content: &[u8]) -> RemoteResult<()> {
        let abs = self.absolute(relative);
        let name = abs
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = abs.with_file_name(format!(".{name}.docsync-tmp"));
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| io_error(relative, e))?;
        tokio::fs::rename(&tmp, &abs)
            .await
            .map_err(|e| io_error(relative, e))
    }
}

#[async_trait::async_trait]
impl IRemoteRepository for DirectoryRepository {
    fn capabilities(&self) -> RepositoryCapabilities {
        RepositoryCapabilities {
            supports_change_log: false,
            max_change_items: None,
        }
    }

    async fn get_object_by_path(&self, path: &RemotePath) -> RemoteResult<RemoteObject> {
        let relative = path.strip_prefix(&RemotePath::root()).unwrap_or_default();
        self.object_at(relative).await
    }

    async fn get_object(&self, id: &RemoteId) -> RemoteResult<RemoteObject> {
        let relative = self.relative_of(id)?;
        self.object_at(&relative).await
    }

    async fn get_children(&self, folder: &RemoteId) -> RemoteResult<Vec<RemoteObject>> {
        let relative = self.relative_of(folder)?;
        let mut dir = tokio::fs::read_dir(self.absolute(&relative))
            .await
            .map_err(|e| io_error(&relative, e))?;

        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| io_error(&relative, e))? {
            match entry.file_name().into_string() {
                Ok(name) if !name.ends_with(".docsync-tmp") => names.push(name),
                Ok(_) => {}
                Err(name) => debug!(name = ?name, "Skipping non-UTF-8 name"),
            }
        }
        names.sort();

        let mut children = Vec::with_capacity(names.len());
        for name in names {
            match self.object_at(&Self::child_relative(&relative, &name)).await {
                Ok(object) => children.push(object),
                // Removed between listing and stat
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(children)
    }

    async fn get_content_stream(&self, document: &RemoteId) -> RemoteResult<Vec<u8>> {
        let relative = self.relative_of(document)?;
        tokio::fs::read(self.absolute(&relative))
            .await
            .map_err(|e| io_error(&relative, e))
    }

    async fn get_content_changes(
        &self,
        _token: &ChangeToken,
        _include_properties: bool,
        _max_items: u32,
    ) -> RemoteResult<ChangePage> {
        Err(RemoteError::Runtime("change log not supported".to_string()))
    }

    async fn get_latest_change_token(&self) -> RemoteResult<Option<ChangeToken>> {
        Err(RemoteError::Runtime("change log not supported".to_string()))
    }

    async fn create_document(
        &self,
        parent: &RemoteId,
        name: &str,
        content: &[u8],
    ) -> RemoteResult<RemoteObject> {
        check_name(name)?;
        let relative = Self::child_relative(&self.relative_of(parent)?, name);
        if tokio::fs::try_exists(self.absolute(&relative))
            .await
            .unwrap_or(false)
        {
            return Err(RemoteError::NameConstraintViolation(format!(
                "{relative} already exists"
            )));
        }
        self.write_atomic(&relative, content).await?;
        self.object_at(&relative).await
    }

    async fn create_folder(&self, parent: &RemoteId, name: &str) -> RemoteResult<RemoteObject> {
        check_name(name)?;
        let relative = Self::child_relative(&self.relative_of(parent)?, name);
        tokio::fs::create_dir(self.absolute(&relative))
            .await
            .map_err(|e| io_error(&relative, e))?;
        self.object_at(&relative).await
    }

    async fn set_content_stream(
        &self,
        document: &RemoteId,
        content: &[u8],
    ) -> RemoteResult<RemoteObject> {
        let relative = self.relative_of(document)?;
        if !tokio::fs::metadata(self.absolute(&relative))
            .await
            .map_err(|e| io_error(&relative, e))?
            .is_file()
        {
            return Err(RemoteError::Runtime(format!("{relative} is not a document")));
        }
        self.write_atomic(&relative, content).await?;
        self.object_at(&relative).await
    }

    async fn move_object(
        &self,
        object: &RemoteId,
        source_folder: &RemoteId,
        target_folder: &RemoteId,
    ) -> RemoteResult<RemoteObject> {
        let relative = self.relative_of(object)?;
        let source = self.relative_of(source_folder)?;
        let target = self.relative_of(target_folder)?;
        let (current_parent, name) = match relative.rsplit_once('/') {
            Some((parent, name)) => (parent.to_string(), name.to_string()),
            None => (String::new(), relative.clone()),
        };
        if current_parent != source {
            return Err(RemoteError::Runtime(format!(
                "{relative} is not in folder /{source}"
            )));
        }

        let destination = Self::child_relative(&target, &name);
        if tokio::fs::try_exists(self.absolute(&destination))
            .await
            .unwrap_or(false)
        {
            return Err(RemoteError::NameConstraintViolation(format!(
                "{destination} already exists"
            )));
        }
        tokio::fs::rename(self.absolute(&relative), self.absolute(&destination))
            .await
            .map_err(|e| io_error(&relative, e))?;
        self.rekey(&relative, &destination)?;
        self.object_at(&destination).await
    }

    async fn update_properties(
        &self,
        object: &RemoteId,
        properties: &ObjectProperties,
    ) -> RemoteResult<RemoteObject> {
        let relative = self.relative_of(object)?;
        let Some(name) = &properties.name else {
            return self.object_at(&relative).await;
        };
        check_name(name)?;

        let parent = relative
            .rsplit_once('/')
            .map(|(p, _)| p.to_string())
            .unwrap_or_default();
        let destination = Self::child_relative(&parent, name);
        if destination != relative
            && tokio::fs::try_exists(self.absolute(&destination))
                .await
                .unwrap_or(false)
        {
            return Err(RemoteError::NameConstraintViolation(format!(
                "{destination} already exists"
            )));
        }
        tokio::fs::rename(self.absolute(&relative), self.absolute(&destination))
            .await
            .map_err(|e| io_error(&relative, e))?;
        self.rekey(&relative, &destination)?;
        self.object_at(&destination).await
    }

    async fn delete_tree(
        &self,
        folder: &RemoteId,
        _continue_on_failure: bool,
    ) -> RemoteResult<Vec<RemoteId>> {
        let relative = self.relative_of(folder)?;
        if relative.is_empty() {
            return Err(RemoteError::PermissionDenied("cannot delete the root".to_string()));
        }
        tokio::fs::remove_dir_all(self.absolute(&relative))
            .await
            .map_err(|e| io_error(&relative, e))?;
        self.forget(&relative)?;
        Ok(Vec::new())
    }

    async fn delete_all_versions(&self, document: &RemoteId) -> RemoteResult<()> {
        let relative = self.relative_of(document)?;
        tokio::fs::remove_file(self.absolute(&relative))
            .await
            .map_err(|e| io_error(&relative, e))?;
        self.forget(&relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, DirectoryRepository) {
        let dir = TempDir::new().unwrap();
        let repo = DirectoryRepository::new(dir.path()).unwrap();
        (dir, repo)
    }

    async fn root_id(repo: &DirectoryRepository) -> RemoteId {
        repo.get_object_by_path(&RemotePath::root()).await.unwrap().id
    }

    #[test]
    fn test_new_rejects_missing_root() {
        let dir = TempDir::new().unwrap();
        let result = DirectoryRepository::new(dir.path().join("missing"));
        assert!(matches!(result, Err(RemoteError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_and_read_document() {
        let (dir, repo) = setup();
        let root = root_id(&repo).await;

        let folder = repo.create_folder(&root, "docs").await.unwrap();
        let doc = repo
            .create_document(&folder.id, "a.txt", b"hello")
            .await
            .unwrap();

        assert_eq!(doc.path.as_str(), "/docs/a.txt");
        assert_eq!(doc.parent_id, Some(folder.id.clone()));
        assert_eq!(doc.content_hash, content_hash(b"hello"));
        assert_eq!(std::fs::read(dir.path().join("docs/a.txt")).unwrap(), b"hello");
        assert_eq!(repo.get_content_stream(&doc.id).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_create_document_rejects_existing_name() {
        let (dir, repo) = setup();
        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();
        let root = root_id(&repo).await;

        let err = repo.create_document(&root, "a.txt", b"y").await.unwrap_err();
        assert!(matches!(err, RemoteError::NameConstraintViolation(_)));
    }

    #[tokio::test]
    async fn test_get_children_lists_sorted() {
        let (dir, repo) = setup();
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();

        let children = repo.get_children(&root_id(&repo).await).await.unwrap();
        let names: Vec<_> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b.txt"]);
        assert!(children[0].is_folder());
        assert!(children[1].is_document());
    }

    #[tokio::test]
    async fn test_move_keeps_identity() {
        let (dir, repo) = setup();
        std::fs::create_dir_all(dir.path().join("src/sub")).unwrap();
        std::fs::write(dir.path().join("src/sub/f.txt"), b"f").unwrap();
        std::fs::create_dir(dir.path().join("dst")).unwrap();

        let src = repo
            .get_object_by_path(&RemotePath::new("/src".into()).unwrap())
            .await
            .unwrap();
        let sub = repo
            .get_object_by_path(&RemotePath::new("/src/sub".into()).unwrap())
            .await
            .unwrap();
        let file = repo
            .get_object_by_path(&RemotePath::new("/src/sub/f.txt".into()).unwrap())
            .await
            .unwrap();
        let dst = repo
            .get_object_by_path(&RemotePath::new("/dst".into()).unwrap())
            .await
            .unwrap();

        let moved = repo.move_object(&sub.id, &src.id, &dst.id).await.unwrap();
        assert_eq!(moved.id, sub.id);
        assert_eq!(moved.path.as_str(), "/dst/sub");

        let file_now = repo.get_object(&file.id).await.unwrap();
        assert_eq!(file_now.path.as_str(), "/dst/sub/f.txt");
    }

    #[tokio::test]
    async fn test_rename_via_properties() {
        let (dir, repo) = setup();
        std::fs::write(dir.path().join("old.txt"), b"x").unwrap();
        let old = repo
            .get_object_by_path(&RemotePath::new("/old.txt".into()).unwrap())
            .await
            .unwrap();

        let renamed = repo
            .update_properties(&old.id, &ObjectProperties::rename("new.txt"))
            .await
            .unwrap();
        assert_eq!(renamed.id, old.id);
        assert!(dir.path().join("new.txt").exists());
        assert!(!dir.path().join("old.txt").exists());
    }

    #[tokio::test]
    async fn test_delete_tree_and_document() {
        let (dir, repo) = setup();
        std::fs::create_dir_all(dir.path().join("docs/sub")).unwrap();
        std::fs::write(dir.path().join("docs/sub/a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();

        let docs = repo
            .get_object_by_path(&RemotePath::new("/docs".into()).unwrap())
            .await
            .unwrap();
        let b = repo
            .get_object_by_path(&RemotePath::new("/b.txt".into()).unwrap())
            .await
            .unwrap();

        assert!(repo.delete_tree(&docs.id, true).await.unwrap().is_empty());
        repo.delete_all_versions(&b.id).await.unwrap();

        assert!(!dir.path().join("docs").exists());
        assert!(!dir.path().join("b.txt").exists());
        assert!(repo.get_object(&docs.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_no_change_log() {
        let (_dir, repo) = setup();
        assert!(!repo.capabilities().supports_change_log);
        assert!(repo.get_latest_change_token().await.is_err());
    }
}
