//! docsync Cache - Sync state persistence
//!
//! Stores, for one synchronized folder:
//! - Per-item sync records (paths, remote id, last-seen timestamp, checksum)
//! - Per-item, per-operation retry counters
//! - The change-feed token and a few folder-level settings
//!
//! ## Architecture
//!
//! This crate implements the `IStateStore` port from `docsync-core`. It is
//! a driven (secondary) adapter in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteStateStore`] - SQLite `IStateStore` implementation
//! - [`InMemoryStateStore`] - `dashmap`-backed store with identical semantics
//! - [`StateStoreError`] - Error types for store operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use docsync_cache::{DatabasePool, SqliteStateStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/docsync/state.db")).await?;
//! let store = SqliteStateStore::new(pool.pool().clone());
//! // Use store as IStateStore...
//! # Ok(())
//! # }
//! ```

pub mod memory;
pub mod pool;
pub mod store;
mod subtree;

pub use memory::InMemoryStateStore;
pub use pool::DatabasePool;
pub use store::SqliteStateStore;

/// Settings key holding the last fully applied change token
pub const CHANGE_TOKEN_KEY: &str = "change_log_token";

/// Errors that can occur during state store operations
#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be converted back into a domain type
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for StateStoreError {
    fn from(e: sqlx::Error) -> Self {
        StateStoreError::QueryFailed(e.to_string())
    }
}

impl From<docsync_core::domain::DomainError> for StateStoreError {
    fn from(e: docsync_core::domain::DomainError) -> Self {
        StateStoreError::SerializationError(e.to_string())
    }
}
