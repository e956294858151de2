//! Local filesystem events
//!
//! Raw watcher notifications are reduced to these four kinds before they
//! reach the watcher reconciler. Paths are absolute.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// What happened to a path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsEventKind {
    Created,
    Changed,
    Deleted,
    /// Renamed or moved; `path` on the event is the new location
    Renamed { old_path: PathBuf },
}

impl FsEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            FsEventKind::Created => "created",
            FsEventKind::Changed => "changed",
            FsEventKind::Deleted => "deleted",
            FsEventKind::Renamed { .. } => "renamed",
        }
    }
}

/// A single local filesystem event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
}

impl FsEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: FsEventKind::Created,
            path: path.into(),
        }
    }

    pub fn changed(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: FsEventKind::Changed,
            path: path.into(),
        }
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: FsEventKind::Deleted,
            path: path.into(),
        }
    }

    pub fn renamed(old_path: impl Into<PathBuf>, new_path: impl Into<PathBuf>) -> Self {
        Self {
            kind: FsEventKind::Renamed {
                old_path: old_path.into(),
            },
            path: new_path.into(),
        }
    }

    /// The previous location for renames
    pub fn old_path(&self) -> Option<&Path> {
        match &self.kind {
            FsEventKind::Renamed { old_path } => Some(old_path),
            _ => None,
        }
    }
}

impl std::fmt::Display for FsEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            FsEventKind::Renamed { old_path } => {
                write!(f, "renamed {} -> {}", old_path.display(), self.path.display())
            }
            kind => write!(f, "{} {}", kind.name(), self.path.display()),
        }
    }
}
