//! In-memory implementation of IStateStore
//!
//! Same semantics as the SQLite store, backed by `dashmap`. Used by the
//! reconciler test-suites and for dry runs.

use dashmap::DashMap;

use docsync_core::domain::{
    newtypes::{ChangeToken, RemoteId, RemotePath, SyncPath},
    sync_item::{OperationKind, RetryCounters, SyncItem},
};
use docsync_core::ports::IStateStore;

use crate::subtree::relocate;
use crate::CHANGE_TOKEN_KEY;

/// `dashmap`-backed state store
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    items: DashMap<SyncPath, SyncItem>,
    counters: DashMap<(SyncPath, OperationKind), u32>,
    settings: DashMap<String, String>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn counters_for(&self, path: &SyncPath) -> RetryCounters {
        let mut counters = RetryCounters::default();
        for kind in OperationKind::ALL {
            if let Some(v) = self.counters.get(&(path.clone(), kind)) {
                counters.set(kind, *v);
            }
        }
        counters
    }

    fn with_counters(&self, item: SyncItem) -> SyncItem {
        let counters = self.counters_for(item.local_path());
        item.with_retry_counters(counters)
    }

    /// First record (by local path) matching `pred`
    fn find(&self, pred: impl Fn(&SyncItem) -> bool) -> Option<SyncItem> {
        self.items
            .iter()
            .filter(|entry| pred(entry.value()))
            .map(|entry| entry.value().clone())
            .min_by(|a, b| a.local_path().cmp(b.local_path()))
            .map(|item| self.with_counters(item))
    }

    fn subtree_keys(&self, root: &SyncPath) -> Vec<SyncPath> {
        self.items
            .iter()
            .filter(|entry| entry.key().starts_with(root))
            .map(|entry| entry.key().clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl IStateStore for InMemoryStateStore {
    async fn save_item(&self, item: &SyncItem) -> anyhow::Result<()> {
        self.items.insert(item.local_path().clone(), item.clone());
        Ok(())
    }

    async fn get_item(&self, local_path: &SyncPath) -> anyhow::Result<Option<SyncItem>> {
        let item = self.items.get(local_path).map(|entry| entry.value().clone());
        Ok(item.map(|item| self.with_counters(item)))
    }

    async fn get_item_by_remote_path(
        &self,
        remote_path: &RemotePath,
    ) -> anyhow::Result<Option<SyncItem>> {
        Ok(self.find(|item| item.remote_path() == remote_path))
    }

    async fn get_item_by_remote_id(
        &self,
        remote_id: &RemoteId,
    ) -> anyhow::Result<Option<SyncItem>> {
        Ok(self.find(|item| item.remote_id() == Some(remote_id)))
    }

    async fn remove_item(&self, local_path: &SyncPath) -> anyhow::Result<u64> {
        let keys = self.subtree_keys(local_path);
        let mut removed = 0;
        for key in keys {
            if self.items.remove(&key).is_some() {
                removed += 1;
            }
        }
        self.counters.retain(|(path, _), _| !path.starts_with(local_path));
        Ok(removed)
    }

    async fn move_item(
        &self,
        from: &SyncPath,
        to_local: &SyncPath,
        to_remote: &RemotePath,
    ) -> anyhow::Result<()> {
        let keys = self.subtree_keys(from);
        let mut moved = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some((_, item)) = self.items.remove(&key) {
                moved.push((key, relocate(item, from, to_local, to_remote)?));
            }
        }

        for (old, item) in moved {
            let new = item.local_path().clone();
            for kind in OperationKind::ALL {
                self.counters.remove(&(new.clone(), kind));
                if let Some((_, v)) = self.counters.remove(&(old.clone(), kind)) {
                    self.counters.insert((new.clone(), kind), v);
                }
            }
            self.items.insert(new, item);
        }
        Ok(())
    }

    async fn list_items(&self) -> anyhow::Result<Vec<SyncItem>> {
        let mut items: Vec<SyncItem> = self
            .items
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        items.sort_by(|a, b| a.local_path().cmp(b.local_path()));
        Ok(items
            .into_iter()
            .map(|item| self.with_counters(item))
            .collect())
    }

    async fn get_retry_counter(
        &self,
        local_path: &SyncPath,
        kind: OperationKind,
    ) -> anyhow::Result<u32> {
        Ok(self
            .counters
            .get(&(local_path.clone(), kind))
            .map(|v| *v)
            .unwrap_or(0))
    }

    async fn set_retry_counter(
        &self,
        local_path: &SyncPath,
        kind: OperationKind,
        value: u32,
    ) -> anyhow::Result<()> {
        let key = (local_path.clone(), kind);
        if value == 0 {
            self.counters.remove(&key);
        } else {
            self.counters.insert(key, value);
        }
        Ok(())
    }

    async fn get_change_token(&self) -> anyhow::Result<Option<ChangeToken>> {
        match self.settings.get(CHANGE_TOKEN_KEY) {
            Some(token) => Ok(Some(ChangeToken::new(token.value().clone())?)),
            None => Ok(None),
        }
    }

    async fn set_change_token(&self, token: &ChangeToken) -> anyhow::Result<()> {
        self.settings
            .insert(CHANGE_TOKEN_KEY.to_string(), token.as_str().to_string());
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.settings.get(key).map(|v| v.value().clone()))
    }

    async fn set_setting(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.settings.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
