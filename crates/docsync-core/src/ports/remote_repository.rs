//! Remote repository port (driven/secondary port)
//!
//! This module defines the interface to the remote content repository:
//! tree navigation, content transfer, structural changes, and the change
//! feed used for incremental synchronization.
//!
//! ## Design Notes
//!
//! - Unlike the other ports this one returns a typed [`RemoteError`],
//!   because the reconcilers branch on the failure kind: not-found means
//!   "already gone", transient failures count against the item's retry
//!   counter and fail the pass.
//! - Content is transferred as whole byte buffers.
//! - A single call is never interrupted by suspension or cancellation;
//!   callers check their control signal between calls.

use thiserror::Error;

use crate::domain::change::ChangePage;
use crate::domain::newtypes::{ChangeToken, RemoteId, RemotePath};
use crate::domain::remote::{ObjectProperties, RemoteObject};

// ============================================================================
// RemoteError
// ============================================================================

/// Failure reported by the remote repository client
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The object does not exist (any more)
    #[error("Object not found: {0}")]
    NotFound(String),

    /// The repository refused the operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The name is not acceptable to the repository
    #[error("Name constraint violation: {0}")]
    NameConstraintViolation(String),

    /// Network or session failure
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Any other repository fault (e.g. document checked out)
    #[error("Repository fault: {0}")]
    Runtime(String),
}

impl RemoteError {
    /// Not-found means "already gone, not an error"
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }

    /// Failures that may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::ConnectionLost(_) | RemoteError::Runtime(_)
        )
    }

    /// Failures that are retried through the item's retry counter and
    /// mark the pass as failed
    pub fn fails_pass(&self) -> bool {
        self.is_transient() || matches!(self, RemoteError::PermissionDenied(_))
    }
}

/// Result alias for remote repository calls
pub type RemoteResult<T> = Result<T, RemoteError>;

// ============================================================================
// RepositoryCapabilities
// ============================================================================

/// What the repository advertises
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepositoryCapabilities {
    /// Whether `get_content_changes` and `get_latest_change_token` are usable
    pub supports_change_log: bool,
    /// Upper bound for `max_items` in `get_content_changes`, if any
    pub max_change_items: Option<u32>,
}

// ============================================================================
// IRemoteRepository trait
// ============================================================================

/// Port trait for the remote content repository
///
/// ## Implementation Notes
///
/// - `get_children` returns direct children only.
/// - `last_modified` on returned objects must change on every content or
///   property update, so reconcilers can compare it for equality.
/// - `delete_tree` returns the ids that could not be deleted when
///   `continue_on_failure` is set.
#[async_trait::async_trait]
pub trait IRemoteRepository: Send + Sync {
    /// Advertised capabilities
    fn capabilities(&self) -> RepositoryCapabilities;

    /// Fetches an object by path
    async fn get_object_by_path(&self, path: &RemotePath) -> RemoteResult<RemoteObject>;

    /// Fetches an object by id
    async fn get_object(&self, id: &RemoteId) -> RemoteResult<RemoteObject>;

    /// Lists the direct children of a folder
    async fn get_children(&self, folder: &RemoteId) -> RemoteResult<Vec<RemoteObject>>;

    /// Downloads a document's content
    async fn get_content_stream(&self, document: &RemoteId) -> RemoteResult<Vec<u8>>;

    /// Reads one page of changes after `token`
    async fn get_content_changes(
        &self,
        token: &ChangeToken,
        include_properties: bool,
        max_items: u32,
    ) -> RemoteResult<ChangePage>;

    /// Returns the current head of the change feed (`None` if the feed is empty)
    async fn get_latest_change_token(&self) -> RemoteResult<Option<ChangeToken>>;

    /// Creates a document with the given content
    async fn create_document(
        &self,
        parent: &RemoteId,
        name: &str,
        content: &[u8],
    ) -> RemoteResult<RemoteObject>;

    /// Creates an empty folder
    async fn create_folder(&self, parent: &RemoteId, name: &str) -> RemoteResult<RemoteObject>;

    /// Replaces a document's content
    async fn set_content_stream(
        &self,
        document: &RemoteId,
        content: &[u8],
    ) -> RemoteResult<RemoteObject>;

    /// Moves an object from one folder to another, keeping its identity
    async fn move_object(
        &self,
        object: &RemoteId,
        source_folder: &RemoteId,
        target_folder: &RemoteId,
    ) -> RemoteResult<RemoteObject>;

    /// Updates properties (e.g. renames) keeping the object's identity
    async fn update_properties(
        &self,
        object: &RemoteId,
        properties: &ObjectProperties,
    ) -> RemoteResult<RemoteObject>;

    /// Deletes a folder and everything below it
    async fn delete_tree(
        &self,
        folder: &RemoteId,
        continue_on_failure: bool,
    ) -> RemoteResult<Vec<RemoteId>>;

    /// Deletes a document with all of its versions
    async fn delete_all_versions(&self, document: &RemoteId) -> RemoteResult<()>;
}
