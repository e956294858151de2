//! Local filesystem port (driven/secondary port)
//!
//! This module defines the interface the reconcilers use to read and
//! mutate the local tree: listing folders, reading and writing content,
//! renames and deletions, and checksum computation.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because filesystem errors are adapter-specific.
//!   Reconcilers treat any error here as "skip this item with a warning".
//! - `write_file` must be atomic: readers observe either the old or the
//!   new content, never a partial write.
//! - `stat` returns `FileSystemState::not_found()` for missing paths instead
//!   of an error.

use chrono::{DateTime, Utc};

use crate::domain::newtypes::{FileHash, SyncPath};

// ============================================================================
// FileSystemState
// ============================================================================

/// Snapshot of a path's state on the local filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSystemState {
    /// Whether the file/directory exists on disk
    pub exists: bool,
    /// Whether this is a directory
    pub is_dir: bool,
    /// Size in bytes (0 for directories or non-existent files)
    pub size: u64,
    /// Last modification time (None if not available or path doesn't exist)
    pub modified: Option<DateTime<Utc>>,
}

impl FileSystemState {
    /// Returns a state representing a non-existent path
    pub fn not_found() -> Self {
        Self {
            exists: false,
            is_dir: false,
            size: 0,
            modified: None,
        }
    }

    /// Returns true if the path exists and is a regular file
    pub fn is_file(&self) -> bool {
        self.exists && !self.is_dir
    }

    /// Returns true if the path exists and is a directory
    pub fn is_directory(&self) -> bool {
        self.exists && self.is_dir
    }
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    /// File name (UTF-8; non-UTF-8 names are not listed)
    pub name: String,
    /// Absolute path
    pub path: SyncPath,
    /// Whether this entry is a directory
    pub is_dir: bool,
}

// ============================================================================
// ILocalFileSystem trait
// ============================================================================

/// Port trait for local filesystem operations
///
/// ## Implementation Notes
///
/// - All paths are `SyncPath` instances, which are guaranteed to be absolute.
/// - `compute_hash` must produce the same checksum the state store records
///   (Base64 SHA-256 for the provided adapter).
/// - `list_dir` returns entries sorted by name so walks are deterministic.
#[async_trait::async_trait]
pub trait ILocalFileSystem: Send + Sync {
    /// Lists the direct children of a directory, sorted by name
    async fn list_dir(&self, path: &SyncPath) -> anyhow::Result<Vec<LocalEntry>>;

    /// Gets the current state of a file or directory
    async fn stat(&self, path: &SyncPath) -> anyhow::Result<FileSystemState>;

    /// Reads the entire contents of a file
    async fn read_file(&self, path: &SyncPath) -> anyhow::Result<Vec<u8>>;

    /// Atomically replaces (or creates) a file's content
    ///
    /// Parent directories are created as needed. When `modified` is given
    /// the file's modification time is set to it.
    async fn write_file(
        &self,
        path: &SyncPath,
        data: &[u8],
        modified: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()>;

    /// Creates a directory and all parent directories as needed
    async fn create_dir_all(&self, path: &SyncPath) -> anyhow::Result<()>;

    /// Renames a file or directory
    async fn rename(&self, from: &SyncPath, to: &SyncPath) -> anyhow::Result<()>;

    /// Deletes a file
    async fn remove_file(&self, path: &SyncPath) -> anyhow::Result<()>;

    /// Deletes a directory and everything below it
    async fn remove_dir_all(&self, path: &SyncPath) -> anyhow::Result<()>;

    /// Computes the content checksum of a file
    async fn compute_hash(&self, path: &SyncPath) -> anyhow::Result<FileHash>;

    /// Returns true if the path exists
    async fn exists(&self, path: &SyncPath) -> anyhow::Result<bool> {
        Ok(self.stat(path).await?.exists)
    }
}
