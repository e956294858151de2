//! Which names and subtrees take part in synchronization
//!
//! - Ignored repository subtrees match by path prefix (segment-aware).
//! - Ignored names match by glob, e.g. `~$*` or `*.tmp`.
//! - Invalid names cannot be represented on common local filesystems and
//!   are skipped with a warning, never renamed.

use glob::Pattern;
use tracing::warn;

use docsync_core::domain::newtypes::RemotePath;

use crate::filesystem::PARTIAL_SUFFIX;

const INVALID_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Path and name filter for one synchronized folder
#[derive(Debug, Clone)]
pub struct SyncFilter {
    ignored_paths: Vec<RemotePath>,
    ignored_names: Vec<Pattern>,
}

impl SyncFilter {
    /// Builds the filter; malformed glob patterns are logged and dropped
    pub fn new(ignored_paths: Vec<RemotePath>, ignored_names: &[String]) -> Self {
        let ignored_names = ignored_names
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "Ignoring malformed name pattern");
                    None
                }
            })
            .collect();
        Self {
            ignored_paths,
            ignored_names,
        }
    }

    /// True if `path` is or lies below an ignored subtree
    pub fn is_ignored_path(&self, path: &RemotePath) -> bool {
        self.ignored_paths.iter().any(|p| path.starts_with(p))
    }

    /// True for scratch files that are never synchronized
    pub fn is_ignored_name(&self, name: &str) -> bool {
        name.ends_with(PARTIAL_SUFFIX) || self.ignored_names.iter().any(|p| p.matches(name))
    }

    /// True for names that cannot be created locally
    pub fn is_invalid_name(name: &str) -> bool {
        name.is_empty()
            || name == "."
            || name == ".."
            || name.ends_with(' ')
            || name.ends_with('.')
            || name.chars().any(|c| c.is_control() || INVALID_CHARS.contains(&c))
    }

    /// Neither ignored nor invalid
    pub fn accepts(&self, name: &str) -> bool {
        !self.is_ignored_name(name) && !Self::is_invalid_name(name)
    }
}
