//! Runtime settings and the shared reconciliation context
//!
//! [`SyncSettings`] is the validated, typed form of the `sync:` section of
//! the YAML configuration. [`SyncContext`] bundles the settings with every
//! port and policy object the three reconcilers share for one synchronized
//! folder; it is built once and handed around as `Arc<SyncContext>`.

use std::sync::Arc;
use std::time::Duration;

use docsync_conflict::{ConflictPolicy, ConflictResolver, StaleConflictTracker};
use docsync_core::{
    config::{expand_tilde, Config, DEFAULT_IGNORED_NAMES},
    domain::{
        newtypes::{RemotePath, SyncPath},
        DomainError,
    },
    ports::{
        ILocalEventSource, ILocalFileSystem, INotificationService, IRemoteRepository, IStateStore,
    },
};

use crate::filter::SyncFilter;
use crate::retry::RetryTracker;
use crate::SyncError;

// ============================================================================
// SyncSettings
// ============================================================================

/// Validated runtime settings for one synchronized folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub local_root: SyncPath,
    pub remote_root: RemotePath,
    /// Propagate local changes to the repository
    pub bidirectional: bool,
    /// Period of FULL requests
    pub poll_interval: Duration,
    /// Local quiet time before a PARTIAL pass
    pub debounce_delay: Duration,
    /// A crawl is forced once this much time passed since the last one
    pub full_crawl_interval: Duration,
    /// Change-feed page size when the repository does not cap it
    pub change_batch_size: u32,
    /// Attempts per item and operation kind before the operation is skipped
    pub max_retries: u32,
    /// Wait before a local deletion is confirmed
    pub delete_recheck_delay: Duration,
    /// Identity used in conflict copy names
    pub user_name: String,
    pub ignored_paths: Vec<RemotePath>,
    pub ignored_names: Vec<String>,
}

impl SyncSettings {
    /// Settings with the configuration defaults for the given roots
    pub fn new(local_root: SyncPath, remote_root: RemotePath) -> Self {
        Self {
            local_root,
            remote_root,
            bidirectional: true,
            poll_interval: Duration::from_secs(60),
            debounce_delay: Duration::from_secs(2),
            full_crawl_interval: Duration::from_secs(4 * 60 * 60),
            change_batch_size: 100,
            max_retries: 3,
            delete_recheck_delay: Duration::from_millis(500),
            user_name: "user".to_string(),
            ignored_paths: Vec::new(),
            ignored_names: DEFAULT_IGNORED_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Converts the `sync:` section of a configuration
    ///
    /// # Errors
    /// Returns `SyncError::Domain` if a root or ignored path is malformed
    pub fn from_config(config: &Config) -> Result<Self, SyncError> {
        let sync = &config.sync;
        let local_root = SyncPath::new(expand_tilde(&sync.local_root))?;
        let remote_root = RemotePath::new(sync.remote_root.clone())?;
        let ignored_paths = sync
            .ignored_paths
            .iter()
            .map(|p| RemotePath::new(p.clone()))
            .collect::<Result<Vec<_>, DomainError>>()?;

        Ok(Self {
            local_root,
            remote_root,
            bidirectional: sync.bidirectional,
            poll_interval: Duration::from_secs(sync.poll_interval),
            debounce_delay: Duration::from_secs(sync.debounce_delay),
            full_crawl_interval: Duration::from_secs(sync.full_crawl_interval),
            change_batch_size: sync.change_batch_size.max(1),
            max_retries: sync.max_retries,
            delete_recheck_delay: Duration::from_millis(sync.delete_recheck_delay_ms),
            user_name: sync.user_name.clone(),
            ignored_paths,
            ignored_names: sync.ignored_names.clone(),
        })
    }
}

// ============================================================================
// SyncContext
// ============================================================================

/// Everything the reconcilers of one synchronized folder share
pub struct SyncContext {
    pub settings: SyncSettings,
    pub remote: Arc<dyn IRemoteRepository>,
    pub state: Arc<dyn IStateStore>,
    pub local: Arc<dyn ILocalFileSystem>,
    pub events: Arc<dyn ILocalEventSource>,
    pub notifier: Arc<dyn INotificationService>,
    pub resolver: ConflictResolver,
    pub stale_conflicts: StaleConflictTracker,
    pub filter: SyncFilter,
    pub retries: RetryTracker,
}

impl SyncContext {
    pub fn new(
        settings: SyncSettings,
        policy: ConflictPolicy,
        remote: Arc<dyn IRemoteRepository>,
        state: Arc<dyn IStateStore>,
        local: Arc<dyn ILocalFileSystem>,
        events: Arc<dyn ILocalEventSource>,
        notifier: Arc<dyn INotificationService>,
    ) -> Self {
        let nag_after = policy.nag_after_passes();
        let resolver = ConflictResolver::new(
            Arc::clone(&local),
            Arc::clone(&notifier),
            policy,
            settings.user_name.clone(),
            settings.local_root.clone(),
        );
        let stale_conflicts = StaleConflictTracker::new(resolver.namer().clone(), nag_after);
        let filter = SyncFilter::new(settings.ignored_paths.clone(), &settings.ignored_names);
        let retries = RetryTracker::new(settings.max_retries);

        Self {
            settings,
            remote,
            state,
            local,
            events,
            notifier,
            resolver,
            stale_conflicts,
            filter,
            retries,
        }
    }

    /// Local location of a repository path below the remote root
    pub fn local_path_for(&self, remote: &RemotePath) -> Result<SyncPath, SyncError> {
        let relative = remote
            .strip_prefix(&self.settings.remote_root)
            .ok_or_else(|| DomainError::PathNotInSyncRoot(remote.to_string()))?;
        let path = relative
            .split('/')
            .filter(|seg| !seg.is_empty())
            .try_fold(self.settings.local_root.clone(), |acc, seg| acc.join(seg))?;
        Ok(path)
    }

    /// Repository location of a local path below the local root
    pub fn remote_path_for(&self, local: &SyncPath) -> Result<RemotePath, SyncError> {
        let relative = local.relative_to(&self.settings.local_root)?;
        let relative = relative
            .to_str()
            .ok_or_else(|| DomainError::InvalidPath(local.to_string()))?;
        Ok(self.settings.remote_root.join_relative(relative)?)
    }

    /// Below the remote root and not in an ignored subtree
    pub fn in_scope(&self, remote: &RemotePath) -> bool {
        remote.starts_with(&self.settings.remote_root) && !self.filter.is_ignored_path(remote)
    }

    /// Local paths strictly below the local root
    pub fn is_below_root(&self, local: &SyncPath) -> bool {
        local != &self.settings.local_root && local.starts_with(&self.settings.local_root)
    }
}
