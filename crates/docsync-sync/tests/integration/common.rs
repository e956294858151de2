//! Shared test helpers for the reconciler integration tests
//!
//! Every test gets a fresh temporary local root, an in-memory repository
//! whose synchronized folder is `/docs`, an in-memory state store and a
//! notifier that records what it was asked to show.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tokio::sync::{Notify, Semaphore};

use docsync_cache::InMemoryStateStore;
use docsync_conflict::ConflictPolicy;
use docsync_core::domain::{
    ChangePage, ChangeToken, FileHash, ObjectProperties, RemoteId, RemoteObject, RemotePath,
    SyncItem, SyncPath,
};
use docsync_core::ports::{
    ILocalEventSource, INotificationService, IRemoteRepository, IStateStore, Notification, RemoteResult,
    RepositoryCapabilities,
};
use docsync_remote::InMemoryRepository;
use docsync_sync::actions::ItemActions;
use docsync_sync::filesystem::hash_bytes;
use docsync_sync::{
    ChangeLogReconciler, CoalescingEventQueue, CrawlReconciler, LocalFileSystemAdapter,
    PassReport, SyncContext, SyncControl, SyncOrchestrator, SyncSettings, WatcherReconciler,
};

pub const REMOTE_ROOT: &str = "/docs";

// ============================================================================
// RecordingNotifier
// ============================================================================

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn categories(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.category.clone())
            .collect()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.body.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl INotificationService for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

// ============================================================================
// GatedRepository
// ============================================================================

/// Repository wrapper whose first folder listing blocks until opened
///
/// Lets a test hold a pass in the middle of its walk.
pub struct GatedRepository {
    inner: Arc<InMemoryRepository>,
    armed: std::sync::atomic::AtomicBool,
    entered: Notify,
    gate: Semaphore,
}

impl GatedRepository {
    pub fn new(inner: Arc<InMemoryRepository>) -> Self {
        Self {
            inner,
            armed: std::sync::atomic::AtomicBool::new(true),
            entered: Notify::new(),
            gate: Semaphore::new(0),
        }
    }

    /// Resolves once a pass is blocked in the gate
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

#[async_trait::async_trait]
impl IRemoteRepository for GatedRepository {
    fn capabilities(&self) -> RepositoryCapabilities {
        self.inner.capabilities()
    }

    async fn get_object_by_path(&self, path: &RemotePath) -> RemoteResult<RemoteObject> {
        self.inner.get_object_by_path(path).await
    }

    async fn get_object(&self, id: &RemoteId) -> RemoteResult<RemoteObject> {
        self.inner.get_object(id).await
    }

    async fn get_children(&self, folder: &RemoteId) -> RemoteResult<Vec<RemoteObject>> {
        if self.armed.swap(false, std::sync::atomic::Ordering::SeqCst) {
            self.entered.notify_one();
            let _permit = self.gate.acquire().await;
        }
        self.inner.get_children(folder).await
    }

    async fn get_content_stream(&self, document: &RemoteId) -> RemoteResult<Vec<u8>> {
        self.inner.get_content_stream(document).await
    }

    async fn get_content_changes(
        &self,
        token: &ChangeToken,
        include_properties: bool,
        max_items: u32,
    ) -> RemoteResult<ChangePage> {
        self.inner
            .get_content_changes(token, include_properties, max_items)
            .await
    }

    async fn get_latest_change_token(&self) -> RemoteResult<Option<ChangeToken>> {
        self.inner.get_latest_change_token().await
    }

    async fn create_document(
        &self,
        parent: &RemoteId,
        name: &str,
        content: &[u8],
    ) -> RemoteResult<RemoteObject> {
        self.inner.create_document(parent, name, content).await
    }

    async fn create_folder(&self, parent: &RemoteId, name: &str) -> RemoteResult<RemoteObject> {
        self.inner.create_folder(parent, name).await
    }

    async fn set_content_stream(
        &self,
        document: &RemoteId,
        content: &[u8],
    ) -> RemoteResult<RemoteObject> {
        self.inner.set_content_stream(document, content).await
    }

    async fn move_object(
        &self,
        object: &RemoteId,
        source_folder: &RemoteId,
        target_folder: &RemoteId,
    ) -> RemoteResult<RemoteObject> {
        self.inner
            .move_object(object, source_folder, target_folder)
            .await
    }

    async fn update_properties(
        &self,
        object: &RemoteId,
        properties: &ObjectProperties,
    ) -> RemoteResult<RemoteObject> {
        self.inner.update_properties(object, properties).await
    }

    async fn delete_tree(
        &self,
        folder: &RemoteId,
        continue_on_failure: bool,
    ) -> RemoteResult<Vec<RemoteId>> {
        self.inner.delete_tree(folder, continue_on_failure).await
    }

    async fn delete_all_versions(&self, document: &RemoteId) -> RemoteResult<()> {
        self.inner.delete_all_versions(document).await
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub dir: TempDir,
    pub repo: Arc<InMemoryRepository>,
    pub state: Arc<InMemoryStateStore>,
    pub queue: Arc<CoalescingEventQueue>,
    pub notifier: Arc<RecordingNotifier>,
    pub ctx: Arc<SyncContext>,
    pub actions: Arc<ItemActions>,
    pub crawler: Arc<CrawlReconciler>,
}

/// Default harness: bidirectional, change feed enabled
pub fn setup() -> Harness {
    setup_with(InMemoryRepository::new(), |_| {})
}

/// Harness over a prepared repository, with adjusted settings
pub fn setup_with(repo: InMemoryRepository, adjust: impl FnOnce(&mut SyncSettings)) -> Harness {
    let repo = Arc::new(repo);
    repo.put_folder(REMOTE_ROOT).unwrap();
    build(Arc::clone(&repo), repo, adjust)
}

/// Harness whose reconcilers talk to `remote` while tests inspect `repo`
pub fn build(
    repo: Arc<InMemoryRepository>,
    remote: Arc<dyn IRemoteRepository>,
    adjust: impl FnOnce(&mut SyncSettings),
) -> Harness {
    let dir = TempDir::new().unwrap();
    let local_root = SyncPath::new(dir.path().to_path_buf()).unwrap();
    let mut settings = SyncSettings::new(local_root, RemotePath::new(REMOTE_ROOT.into()).unwrap());
    settings.user_name = "alice".to_string();
    settings.delete_recheck_delay = std::time::Duration::from_millis(10);
    adjust(&mut settings);

    let state = Arc::new(InMemoryStateStore::new());
    let queue = Arc::new(CoalescingEventQueue::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let ctx = Arc::new(SyncContext::new(
        settings,
        ConflictPolicy::default(),
        remote,
        Arc::clone(&state) as Arc<dyn IStateStore>,
        Arc::new(LocalFileSystemAdapter::new()),
        Arc::clone(&queue) as Arc<dyn ILocalEventSource>,
        Arc::clone(&notifier) as Arc<dyn INotificationService>,
    ));
    let actions = Arc::new(ItemActions::new(
        Arc::clone(&ctx),
        Arc::new(SyncControl::new()),
    ));
    let crawler = Arc::new(CrawlReconciler::new(Arc::clone(&actions)));

    Harness {
        dir,
        repo,
        state,
        queue,
        notifier,
        ctx,
        actions,
        crawler,
    }
}

impl Harness {
    pub fn changelog(&self) -> ChangeLogReconciler {
        ChangeLogReconciler::new(Arc::clone(&self.actions), Arc::clone(&self.crawler))
    }

    pub fn watcher(&self) -> WatcherReconciler {
        WatcherReconciler::new(Arc::clone(&self.actions))
    }

    pub fn orchestrator(&self) -> Arc<SyncOrchestrator> {
        Arc::new(SyncOrchestrator::new(Arc::clone(&self.ctx)))
    }

    pub async fn crawl(&self) -> PassReport {
        self.crawler.reconcile().await.unwrap()
    }

    // ------------------------------------------------------------------
    // Local tree
    // ------------------------------------------------------------------

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn local(&self, relative: &str) -> SyncPath {
        SyncPath::new(self.path(relative)).unwrap()
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    pub fn read(&self, relative: &str) -> Option<String> {
        std::fs::read_to_string(self.path(relative)).ok()
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).exists()
    }

    /// Relative paths of every local file and folder, sorted
    pub fn local_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![self.dir.path().to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                let relative = path.strip_prefix(self.dir.path()).unwrap();
                out.push(relative.to_string_lossy().into_owned());
                if path.is_dir() {
                    stack.push(path);
                }
            }
        }
        out.sort();
        out
    }

    /// Repository paths below the synchronized folder, relative to it
    pub fn remote_paths(&self) -> Vec<String> {
        let prefix = format!("{REMOTE_ROOT}/");
        let mut out: Vec<String> = self
            .repo
            .paths()
            .into_iter()
            .filter_map(|p| p.strip_prefix(&prefix).map(str::to_string))
            .collect();
        out.sort();
        out
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    pub async fn record(&self, relative: &str) -> Option<SyncItem> {
        self.state.get_item(&self.local(relative)).await.unwrap()
    }

    pub async fn token(&self) -> Option<String> {
        self.state
            .get_change_token()
            .await
            .unwrap()
            .map(|t| t.as_str().to_string())
    }
}

pub fn hash(content: &str) -> FileHash {
    hash_bytes(content.as_bytes()).unwrap()
}
