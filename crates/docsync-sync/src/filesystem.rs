//! Local filesystem adapter (secondary/driven adapter)
//!
//! Implements [`ILocalFileSystem`] using `tokio::fs` for async file operations.
//!
//! ## Design Decisions
//!
//! - **Atomic writes**: Uses write-to-temp + rename so readers never see a
//!   partially written file. The temporary sibling is a hidden
//!   `.<name>.docsync-part` file, which the sync filter ignores.
//! - **Checksums**: Base64 SHA-256 of the content, the same format the
//!   remote adapters report, so both sides can be compared without a
//!   download.
//! - **Modification time**: Downloads carry the remote timestamp onto the
//!   local file through `File::set_modified` on a blocking thread.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use docsync_core::{
    domain::newtypes::{FileHash, SyncPath},
    ports::local_filesystem::{FileSystemState, ILocalFileSystem, LocalEntry},
};

/// Suffix of the temporary sibling used for atomic writes
pub const PARTIAL_SUFFIX: &str = ".docsync-part";

// ============================================================================
// LocalFileSystemAdapter
// ============================================================================

/// Adapter that bridges the [`ILocalFileSystem`] port to the real filesystem.
///
/// This is a zero-sized struct because all operations derive their context
/// from the [`SyncPath`] arguments.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystemAdapter;

impl LocalFileSystemAdapter {
    /// Create a new `LocalFileSystemAdapter`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Base64 SHA-256 of `data`
pub fn hash_bytes(data: &[u8]) -> anyhow::Result<FileHash> {
    Ok(FileHash::new(BASE64.encode(Sha256::digest(data)))?)
}

fn temp_sibling(target: &std::path::Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}{PARTIAL_SUFFIX}"))
}

#[async_trait::async_trait]
impl ILocalFileSystem for LocalFileSystemAdapter {
    #[instrument(skip(self), fields(path = %path))]
    async fn list_dir(&self, path: &SyncPath) -> anyhow::Result<Vec<LocalEntry>> {
        let mut dir = tokio::fs::read_dir(path.as_path()).await?;
        let mut entries = Vec::new();

        while let Some(entry) = dir.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                debug!(entry = ?entry.path(), "skipping non-UTF-8 name");
                continue;
            };
            let is_dir = match entry.file_type().await {
                Ok(t) => t.is_dir(),
                // Removed while listing
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            entries.push(LocalEntry {
                path: path.join(&name)?,
                name,
                is_dir,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(count = entries.len(), "directory listed");
        Ok(entries)
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn stat(&self, path: &SyncPath) -> anyhow::Result<FileSystemState> {
        let metadata = match tokio::fs::metadata(path.as_path()).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("path not found");
                return Ok(FileSystemState::not_found());
            }
            Err(e) => return Err(e.into()),
        };

        let is_dir = metadata.is_dir();
        let modified = metadata.modified().ok().map(DateTime::<Utc>::from);

        Ok(FileSystemState {
            exists: true,
            is_dir,
            size: if is_dir { 0 } else { metadata.len() },
            modified,
        })
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn read_file(&self, path: &SyncPath) -> anyhow::Result<Vec<u8>> {
        let data = tokio::fs::read(path.as_path()).await?;
        debug!(bytes = data.len(), "file read complete");
        Ok(data)
    }

    #[instrument(skip(self, data), fields(path = %path, bytes = data.len()))]
    async fn write_file(
        &self,
        path: &SyncPath,
        data: &[u8],
        modified: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()> {
        let target = path.as_path().to_path_buf();

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Same directory, so the rename stays on one filesystem.
        let tmp_path = temp_sibling(&target);
        tokio::fs::write(&tmp_path, data).await?;

        if let Some(modified) = modified {
            let tmp = tmp_path.clone();
            let time = SystemTime::from(modified);
            tokio::task::spawn_blocking(move || {
                std::fs::File::options()
                    .write(true)
                    .open(&tmp)
                    .and_then(|f| f.set_modified(time))
            })
            .await??;
        }

        tokio::fs::rename(&tmp_path, &target).await?;
        debug!("write complete");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn create_dir_all(&self, path: &SyncPath) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(path.as_path()).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(from = %from, to = %to))]
    async fn rename(&self, from: &SyncPath, to: &SyncPath) -> anyhow::Result<()> {
        if let Some(parent) = to.as_path().parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(from.as_path(), to.as_path()).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn remove_file(&self, path: &SyncPath) -> anyhow::Result<()> {
        tokio::fs::remove_file(path.as_path()).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn remove_dir_all(&self, path: &SyncPath) -> anyhow::Result<()> {
        tokio::fs::remove_dir_all(path.as_path()).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn compute_hash(&self, path: &SyncPath) -> anyhow::Result<FileHash> {
        let data = tokio::fs::read(path.as_path()).await?;
        let hash = hash_bytes(&data)?;
        debug!(hash = %hash, "hash computed");
        Ok(hash)
    }
}

// ============================================================================
// Unit tests
// ============================================================================
