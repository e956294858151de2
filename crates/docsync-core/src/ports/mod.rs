//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the reconciliation
//! core depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRemoteRepository`] - Remote content repository (tree, content, change feed)
//! - [`IStateStore`] - Persistent per-item sync records, retry counters, change token
//! - [`ILocalFileSystem`] - Local filesystem operations
//! - [`ILocalEventSource`] - Coalesced local filesystem events
//! - [`INotificationService`] - User-facing notifications

pub mod event_source;
pub mod local_filesystem;
pub mod notification;
pub mod remote_repository;
pub mod state_store;

pub use event_source::ILocalEventSource;
pub use local_filesystem::{FileSystemState, ILocalFileSystem, LocalEntry};
pub use notification::{INotificationService, Notification, NotificationPriority};
pub use remote_repository::{IRemoteRepository, RemoteError, RemoteResult, RepositoryCapabilities};
pub use state_store::{IStateStore, SETTING_SUSPENDED};
