//! Remote change-feed entries

use serde::{Deserialize, Serialize};

use super::newtypes::{ChangeToken, RemoteId};
use super::remote::RemoteObject;

/// Kind of change reported by the repository's change feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteChangeType {
    Created,
    Updated,
    Deleted,
    /// Permissions changed; content and path may be unchanged
    Security,
}

impl std::fmt::Display for RemoteChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RemoteChangeType::Created => "created",
            RemoteChangeType::Updated => "updated",
            RemoteChangeType::Deleted => "deleted",
            RemoteChangeType::Security => "security",
        };
        write!(f, "{}", s)
    }
}

/// One entry of the change feed
///
/// Events for one object arrive in the order the repository applied them.
/// Intermediate states may be omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteChangeEvent {
    pub object_id: RemoteId,
    pub change_type: RemoteChangeType,
    /// Snapshot of the object's properties, when requested and available
    pub properties: Option<RemoteObject>,
}

impl RemoteChangeEvent {
    pub fn new(object_id: RemoteId, change_type: RemoteChangeType) -> Self {
        Self {
            object_id,
            change_type,
            properties: None,
        }
    }
}

/// One page of the change feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePage {
    pub events: Vec<RemoteChangeEvent>,
    /// Cursor to resume from after this page
    pub next_token: ChangeToken,
    /// Whether more pages follow
    pub has_more: bool,
}
