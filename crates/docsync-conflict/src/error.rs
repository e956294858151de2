//! Error types for the conflict engine

use thiserror::Error;

use docsync_core::domain::DomainError;

/// Errors that can occur during conflict detection and resolution
#[derive(Debug, Error)]
pub enum ConflictError {
    /// Every candidate name up to the probe limit is already taken
    #[error("no free conflict copy name for {path} after {max} attempts")]
    ProbeExhausted { path: String, max: u32 },

    /// Invalid glob pattern or winner in a conflict rule
    #[error("invalid conflict rule: {pattern}: {reason}")]
    InvalidRule { pattern: String, reason: String },

    /// The local file could not be inspected or renamed
    #[error("local filesystem error: {0}")]
    LocalFs(#[from] anyhow::Error),

    /// A candidate path failed validation
    #[error(transparent)]
    Domain(#[from] DomainError),
}
