//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for domain identifiers and values.
//! Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// Path types
// ============================================================================

/// A validated absolute local path
///
/// SyncPath ensures the path is:
/// - Absolute (starts with /)
/// - Normalized (no . or .. components)
/// - Within the sync root when validated against one
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "PathBuf", into = "PathBuf")]
pub struct SyncPath(PathBuf);

impl SyncPath {
    /// Create a new SyncPath, validating it is absolute
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPath` if the path is not absolute
    pub fn new(path: PathBuf) -> Result<Self, DomainError> {
        if !path.is_absolute() {
            return Err(DomainError::InvalidPath(format!(
                "Path must be absolute: {}",
                path.display()
            )));
        }

        // We don't use fs::canonicalize() as the path might not exist yet
        let normalized = Self::normalize_path(&path)?;
        Ok(Self(normalized))
    }

    /// Create a SyncPath validated against a sync root
    ///
    /// # Errors
    /// Returns error if path is not within the sync root
    pub fn new_within_root(path: PathBuf, sync_root: &SyncPath) -> Result<Self, DomainError> {
        let sync_path = Self::new(path)?;

        if !sync_path.0.starts_with(&sync_root.0) {
            return Err(DomainError::PathNotInSyncRoot(format!(
                "{} is not within sync root {}",
                sync_path.0.display(),
                sync_root.0.display()
            )));
        }

        Ok(sync_path)
    }

    /// Get the inner path reference
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Convert to owned PathBuf
    #[must_use]
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }

    /// Returns the final component as UTF-8, if any
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.0.file_name().and_then(|n| n.to_str())
    }

    /// Returns the parent directory, or `None` for the filesystem root
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0.parent().map(|p| Self(p.to_path_buf()))
    }

    /// Component-wise prefix test
    #[must_use]
    pub fn starts_with(&self, other: &SyncPath) -> bool {
        self.0.starts_with(&other.0)
    }

    /// Get the path relative to a root
    ///
    /// # Errors
    /// Returns error if this path is not within the root
    pub fn relative_to(&self, root: &SyncPath) -> Result<PathBuf, DomainError> {
        self.0
            .strip_prefix(&root.0)
            .map(|p| p.to_path_buf())
            .map_err(|_| {
                DomainError::PathNotInSyncRoot(format!(
                    "{} is not within {}",
                    self.0.display(),
                    root.0.display()
                ))
            })
    }

    /// Join a single name to this SyncPath
    ///
    /// # Errors
    /// Returns error if the component is empty, a traversal, or contains a separator
    pub fn join(&self, component: &str) -> Result<Self, DomainError> {
        if component.is_empty()
            || component == "."
            || component == ".."
            || component.contains('/')
        {
            return Err(DomainError::InvalidPath(format!(
                "Invalid path component: {component}"
            )));
        }

        Self::new(self.0.join(component))
    }

    /// Rebase this path from `from` onto `to`, keeping the relative part
    ///
    /// # Errors
    /// Returns error if this path is not within `from`
    pub fn rebase(&self, from: &SyncPath, to: &SyncPath) -> Result<Self, DomainError> {
        let relative = self.relative_to(from)?;
        Self::new(to.0.join(relative))
    }

    /// Normalize a path by resolving . and .. components
    fn normalize_path(path: &Path) -> Result<PathBuf, DomainError> {
        use std::path::Component;

        let mut normalized = PathBuf::new();

        for component in path.components() {
            match component {
                Component::Prefix(p) => normalized.push(p.as_os_str()),
                Component::RootDir => normalized.push("/"),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(DomainError::InvalidPath(
                            "Path escapes root via ..".to_string(),
                        ));
                    }
                }
                Component::Normal(c) => normalized.push(c),
            }
        }

        Ok(normalized)
    }
}

impl Display for SyncPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl TryFrom<PathBuf> for SyncPath {
    type Error = DomainError;

    fn try_from(path: PathBuf) -> Result<Self, Self::Error> {
        Self::new(path)
    }
}

impl From<SyncPath> for PathBuf {
    fn from(sync_path: SyncPath) -> Self {
        sync_path.0
    }
}

impl AsRef<Path> for SyncPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// A repository path (must start with /)
///
/// Represents paths as the remote repository addresses them,
/// e.g., "/Shared/Reports/q3.odt"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemotePath(String);

impl RemotePath {
    /// Create a new RemotePath
    ///
    /// # Errors
    /// Returns error if path doesn't start with /, has empty or traversal
    /// segments, or ends with a slash
    pub fn new(path: String) -> Result<Self, DomainError> {
        if !path.starts_with('/') {
            return Err(DomainError::InvalidRemotePath(format!(
                "Remote path must start with '/': {path}"
            )));
        }

        if path.len() > 1 {
            if path.ends_with('/') {
                return Err(DomainError::InvalidRemotePath(format!(
                    "Remote path must not end with '/': {path}"
                )));
            }
            if path.contains("//") {
                return Err(DomainError::InvalidRemotePath(format!(
                    "Remote path contains invalid double slashes: {path}"
                )));
            }
            if path[1..].split('/').any(|seg| seg == "." || seg == "..") {
                return Err(DomainError::InvalidRemotePath(format!(
                    "Remote path contains invalid traversal: {path}"
                )));
            }
        }

        Ok(Self(path))
    }

    /// Create the root path "/"
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Returns true for "/"
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join a single path component
    ///
    /// # Errors
    /// Returns error if component is invalid
    pub fn join(&self, component: &str) -> Result<Self, DomainError> {
        if component.is_empty()
            || component == "."
            || component == ".."
            || component.contains('/')
        {
            return Err(DomainError::InvalidRemotePath(format!(
                "Invalid path component: {component}"
            )));
        }

        let new_path = if self.is_root() {
            format!("/{component}")
        } else {
            format!("{}/{component}", self.0)
        };

        Self::new(new_path)
    }

    /// Join a relative, slash-separated path
    ///
    /// # Errors
    /// Returns error if any segment is invalid
    pub fn join_relative(&self, relative: &str) -> Result<Self, DomainError> {
        relative
            .split('/')
            .filter(|seg| !seg.is_empty())
            .try_fold(self.clone(), |acc, seg| acc.join(seg))
    }

    /// Get the parent path
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }

        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Get the file name component
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }

        self.0.rsplit('/').next()
    }

    /// Segment-aware prefix test: `/a/b` starts with `/a` but not with `/a/bc`
    #[must_use]
    pub fn starts_with(&self, prefix: &RemotePath) -> bool {
        if prefix.is_root() || self.0 == prefix.0 {
            return true;
        }
        self.0.starts_with(&prefix.0) && self.0[prefix.0.len()..].starts_with('/')
    }

    /// Relative part below `prefix` without a leading slash
    ///
    /// Returns `None` if this path is not within `prefix`; the prefix itself
    /// yields an empty string.
    #[must_use]
    pub fn strip_prefix(&self, prefix: &RemotePath) -> Option<&str> {
        if !self.starts_with(prefix) {
            return None;
        }
        if prefix.is_root() {
            return Some(self.0.trim_start_matches('/'));
        }
        Some(self.0[prefix.0.len()..].trim_start_matches('/'))
    }
}

impl Display for RemotePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RemotePath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for RemotePath {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RemotePath> for String {
    fn from(path: RemotePath) -> Self {
        path.0
    }
}

// ============================================================================
// Repository-specific types
// ============================================================================

/// Repository object identifier
///
/// Opaque and stable across renames and moves. Repositories use formats
/// such as `workspace://SpacesStore/6f1c...;1.0`, so only emptiness and
/// whitespace/control characters are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteId(String);

impl RemoteId {
    /// Create a new RemoteId
    ///
    /// # Errors
    /// Returns error if the ID format is invalid
    pub fn new(id: String) -> Result<Self, DomainError> {
        if id.is_empty() {
            return Err(DomainError::InvalidRemoteId(
                "Remote ID cannot be empty".to_string(),
            ));
        }

        if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(DomainError::InvalidRemoteId(format!(
                "Remote ID contains invalid characters: {id:?}"
            )));
        }

        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RemoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RemoteId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for RemoteId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RemoteId> for String {
    fn from(id: RemoteId) -> Self {
        id.0
    }
}

/// Content checksum: SHA-256 digest in Base64 format
///
/// Format: Base64-encoded 32-byte digest (44 characters with padding)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileHash(String);

impl FileHash {
    /// Expected decoded length of a SHA-256 digest
    const EXPECTED_DECODED_LEN: usize = 32;

    /// Create a new FileHash
    ///
    /// # Errors
    /// Returns error if the hash is not valid Base64 or wrong length
    pub fn new(hash: String) -> Result<Self, DomainError> {
        if hash.is_empty() {
            return Err(DomainError::InvalidHash("Hash cannot be empty".to_string()));
        }

        if !hash
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
        {
            return Err(DomainError::InvalidHash(format!(
                "Hash is not valid Base64: {hash}"
            )));
        }

        if hash.len() % 4 != 0 {
            return Err(DomainError::InvalidHash(format!(
                "Hash length is not a multiple of 4: {hash}"
            )));
        }

        let decoded_len = Self::base64_decoded_len(&hash);
        if decoded_len != Self::EXPECTED_DECODED_LEN {
            return Err(DomainError::InvalidHash(format!(
                "Hash has wrong length: expected {} bytes, got {} bytes",
                Self::EXPECTED_DECODED_LEN,
                decoded_len
            )));
        }

        Ok(Self(hash))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Calculate the decoded length of a Base64 string
    fn base64_decoded_len(s: &str) -> usize {
        let padding = s.chars().rev().take_while(|&c| c == '=').count();
        (s.len() * 3 / 4).saturating_sub(padding)
    }
}

impl Display for FileHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileHash {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for FileHash {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<FileHash> for String {
    fn from(hash: FileHash) -> Self {
        hash.0
    }
}

/// Position in the repository's change feed (opaque string)
///
/// Tokens are only ever compared for equality: equal means
/// "no changes since". We do not attempt to order them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChangeToken(String);

impl ChangeToken {
    /// Create a new ChangeToken
    ///
    /// # Errors
    /// Returns error if the token is empty
    pub fn new(token: String) -> Result<Self, DomainError> {
        if token.is_empty() {
            return Err(DomainError::InvalidChangeToken(
                "Change token cannot be empty".to_string(),
            ));
        }

        Ok(Self(token))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ChangeToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChangeToken {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for ChangeToken {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ChangeToken> for String {
    fn from(token: ChangeToken) -> Self {
        token.0
    }
}
