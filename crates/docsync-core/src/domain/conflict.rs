//! Conflict records and resolutions
//!
//! A conflict exists when both the local copy and the repository copy of
//! a known item changed since the last synchronization. Conflicts are
//! ephemeral: they are resolved during the pass that detects them and are
//! never persisted.

use serde::{Deserialize, Serialize};

use super::newtypes::SyncPath;
use super::remote::RemoteObject;

/// Outcome of comparing a known item with its current local and remote state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// No divergent edits (or both sides hold identical content)
    NoConflict,
    /// Preserve the local copy under `rename_local_to`, then fetch the remote version
    RemoteWins { rename_local_to: SyncPath },
    /// Push the local content over the remote document
    LocalWins,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::NoConflict => write!(f, "no_conflict"),
            Resolution::RemoteWins { rename_local_to } => {
                write!(f, "remote_wins (local kept as {})", rename_local_to)
            }
            Resolution::LocalWins => write!(f, "local_wins"),
        }
    }
}

/// A detected conflict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// The local path whose edits lost
    local_path: SyncPath,
    /// The winning repository version
    remote: RemoteObject,
    /// Identity used in the backup name (the local user)
    user: String,
}

impl Conflict {
    pub fn new(local_path: SyncPath, remote: RemoteObject, user: impl Into<String>) -> Self {
        Self {
            local_path,
            remote,
            user: user.into(),
        }
    }

    pub fn local_path(&self) -> &SyncPath {
        &self.local_path
    }

    pub fn remote(&self) -> &RemoteObject {
        &self.remote
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Who last edited the remote copy, or "unknown"
    pub fn remote_editor(&self) -> &str {
        self.remote.last_modified_by.as_deref().unwrap_or("unknown")
    }
}
