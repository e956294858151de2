//! Repository object snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{FileHash, RemoteId, RemotePath};

/// Document or folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Document,
    Folder,
}

/// A repository object as returned by the remote repository client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    /// Stable identifier
    pub id: RemoteId,
    /// Object name (last path segment)
    pub name: String,
    /// Current path
    pub path: RemotePath,
    /// Document or folder
    pub kind: ObjectKind,
    /// Parent folder identifier (`None` for the repository root)
    pub parent_id: Option<RemoteId>,
    /// Server-side modification timestamp
    pub last_modified: DateTime<Utc>,
    /// Identity of the last editor, when the repository reports it
    pub last_modified_by: Option<String>,
    /// Content checksum, when the repository reports one
    pub content_hash: Option<FileHash>,
    /// Content length in bytes (0 for folders)
    pub size: u64,
}

impl RemoteObject {
    /// Returns true for folders
    pub fn is_folder(&self) -> bool {
        self.kind == ObjectKind::Folder
    }

    /// Returns true for documents
    pub fn is_document(&self) -> bool {
        self.kind == ObjectKind::Document
    }
}

/// Updatable object properties
///
/// Only the fields set to `Some` are changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectProperties {
    /// New object name (a rename within the same parent)
    pub name: Option<String>,
}

impl ObjectProperties {
    /// Properties describing a rename
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}
