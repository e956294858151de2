//! Events published by the orchestrator to its caller (UI layer)

use serde::{Deserialize, Serialize};

use super::status::PassKind;

/// Severity of a [`SyncEvent::SyncException`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionLevel {
    /// Worth showing, nothing lost
    Warning,
    /// The pass failed; the next pass retries from the same state
    Error,
}

/// Category of a [`SyncEvent::SyncException`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionKind {
    /// Connection lost or repository busy
    ConnectionLost,
    /// The repository refused an operation
    PermissionDenied,
    /// Local disk or permission problem
    LocalFilesystem,
    /// State store read/write failure
    StateStore,
    /// Anything else caught at the pass boundary
    Unexpected,
}

/// Orchestrator notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    SyncStarted {
        kind: PassKind,
    },
    SyncCompleted {
        kind: PassKind,
        success: bool,
    },
    SyncException {
        level: ExceptionLevel,
        kind: ExceptionKind,
        message: String,
    },
}
