//! Domain entities and value types
//!
//! This module contains the core domain types for docsync:
//! - Newtypes for validated paths, identifiers, hashes and tokens
//! - The `SyncItem` reconciliation unit and its retry counters
//! - Remote objects and change-feed entries
//! - Local filesystem events
//! - Conflict records and resolutions
//! - The orchestrator status machine and its event stream
//! - Domain-specific error types

pub mod change;
pub mod conflict;
pub mod errors;
pub mod events;
pub mod fs_event;
pub mod newtypes;
pub mod remote;
pub mod status;
pub mod sync_item;

// Re-export commonly used types
pub use change::{ChangePage, RemoteChangeEvent, RemoteChangeType};
pub use conflict::{Conflict, Resolution};
pub use errors::DomainError;
pub use events::{ExceptionKind, ExceptionLevel, SyncEvent};
pub use fs_event::{FsEvent, FsEventKind};
pub use newtypes::*;
pub use remote::{ObjectKind, ObjectProperties, RemoteObject};
pub use status::{PassKind, SyncStatus};
pub use sync_item::{OperationKind, RetryCounters, SyncItem};
