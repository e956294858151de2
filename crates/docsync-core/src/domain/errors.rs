//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures, invalid state transitions, and path errors.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid hash format (expected Base64 SHA-256)
    #[error("Invalid hash format: {0}")]
    InvalidHash(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Path is not within the configured sync root
    #[error("Path not within sync root: {0}")]
    PathNotInSyncRoot(String),

    /// Invalid remote path format
    #[error("Invalid remote path: {0}")]
    InvalidRemotePath(String),

    /// Invalid remote ID format
    #[error("Invalid remote ID: {0}")]
    InvalidRemoteId(String),

    /// Invalid change-log token
    #[error("Invalid change token: {0}")]
    InvalidChangeToken(String),

    /// Unknown operation kind name
    #[error("Unknown operation kind: {0}")]
    UnknownOperation(String),
}
