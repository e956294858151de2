//! docsync Sync - Reconciliation engine
//!
//! Provides:
//! - Full-tree crawl reconciliation
//! - Incremental reconciliation driven by the repository change feed
//! - Reconciliation of coalesced local filesystem events
//! - The orchestrator state machine with suspend, resume, cancel and retry
//!
//! ## Modules
//!
//! - [`crawl`] - Depth-first bidirectional tree diff
//! - [`changelog`] - Token-based incremental passes, falling back to crawl
//! - [`watcher_sync`] - Applies drained local events to the repository
//! - [`orchestrator`] - `SyncStatus` machine, pass selection, event stream
//! - [`scheduler`] - Poll timer and debounce timer driving the orchestrator
//! - [`filesystem`] - Local filesystem adapter (atomic writes, SHA-256)
//! - [`watcher`] - `notify` watcher and the coalescing event queue

pub mod actions;
pub mod changelog;
pub mod context;
pub mod control;
pub mod crawl;
pub mod filesystem;
pub mod filter;
pub mod notifier;
pub mod orchestrator;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod watcher;
pub mod watcher_sync;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use docsync_conflict::ConflictError;
use docsync_core::{domain::DomainError, ports::RemoteError};

pub use changelog::ChangeLogReconciler;
pub use context::{SyncContext, SyncSettings};
pub use control::SyncControl;
pub use crawl::{CrawlReconciler, Depth};
pub use filesystem::LocalFileSystemAdapter;
pub use notifier::LogNotifier;
pub use orchestrator::SyncOrchestrator;
pub use report::PassReport;
pub use scheduler::SyncScheduler;
pub use watcher::{CoalescingEventQueue, FileWatcher};
pub use watcher_sync::WatcherReconciler;

/// Errors that can occur during synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// The running pass was cancelled at a checkpoint
    #[error("sync pass cancelled")]
    Cancelled,

    /// A repository call failed
    #[error("repository error: {0}")]
    Remote(#[from] RemoteError),

    /// The state store could not be read or written
    #[error("state store error: {0}")]
    StateStore(anyhow::Error),

    /// A local filesystem operation failed
    #[error("local filesystem error: {0}")]
    LocalFs(anyhow::Error),

    /// Conflict resolution failed
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// A path, id or state transition failed validation
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The filesystem watcher could not be set up
    #[error("watcher error: {0}")]
    Watcher(String),
}

/// Boxed future used by the recursive folder walks
pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SyncError>> + Send + 'a>>;
