//! docsync Remote - Remote repository adapters
//!
//! Provides two implementations of the `IRemoteRepository` port:
//! - [`InMemoryRepository`] - a complete in-process repository with a paged
//!   change feed and fault injection
//! - [`DirectoryRepository`] - a repository rooted at a local directory,
//!   such as a mounted network share
//!
//! ## Modules
//!
//! - [`memory`] - In-memory repository
//! - [`directory`] - Directory-backed repository

pub mod directory;
pub mod memory;

pub use directory::DirectoryRepository;
pub use memory::{InMemoryRepository, RemoteOp};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha2::{Digest, Sha256};

use docsync_core::domain::newtypes::FileHash;

/// Base64 SHA-256 of `data`, the checksum format shared with the local side
pub fn content_hash(data: &[u8]) -> Option<FileHash> {
    FileHash::new(BASE64.encode(Sha256::digest(data))).ok()
}
