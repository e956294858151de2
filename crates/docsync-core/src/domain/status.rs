//! Orchestrator status machine
//!
//! ```text
//!            configured
//!   Init ───────────────► Idle ◄──────────────► Syncing
//!                          │ ▲   start / finish   │ ▲
//!                  suspend │ │ resume     suspend │ │ resume
//!                          ▼ │                    ▼ │
//!                    IdleSuspended ◄──────── SyncingSuspended
//!                                    finish
//! ```

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Status of one synchronized folder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Not yet configured
    #[default]
    Init,
    /// Waiting for the next trigger
    Idle,
    /// A pass is running
    Syncing,
    /// Suspended while idle; triggers are ignored
    IdleSuspended,
    /// Suspended in the middle of a pass; the pass is parked at a checkpoint
    SyncingSuspended,
}

impl SyncStatus {
    /// Returns the state name
    pub fn name(&self) -> &'static str {
        match self {
            SyncStatus::Init => "Init",
            SyncStatus::Idle => "Idle",
            SyncStatus::Syncing => "Syncing",
            SyncStatus::IdleSuspended => "Idle_Suspended",
            SyncStatus::SyncingSuspended => "Syncing_Suspended",
        }
    }

    /// Returns true in either suspended state
    pub fn is_suspended(&self) -> bool {
        matches!(self, SyncStatus::IdleSuspended | SyncStatus::SyncingSuspended)
    }

    /// Returns true while a pass is in progress (suspended or not)
    pub fn is_syncing(&self) -> bool {
        matches!(self, SyncStatus::Syncing | SyncStatus::SyncingSuspended)
    }

    /// `Init -> Idle`
    pub fn configured(self) -> Result<Self, DomainError> {
        match self {
            SyncStatus::Init => Ok(SyncStatus::Idle),
            other => Err(other.invalid(SyncStatus::Idle)),
        }
    }

    /// `Idle -> Syncing`
    pub fn start_pass(self) -> Result<Self, DomainError> {
        match self {
            SyncStatus::Idle => Ok(SyncStatus::Syncing),
            other => Err(other.invalid(SyncStatus::Syncing)),
        }
    }

    /// `Syncing -> Idle`, or `Syncing_Suspended -> Idle_Suspended`
    pub fn finish_pass(self) -> Result<Self, DomainError> {
        match self {
            SyncStatus::Syncing => Ok(SyncStatus::Idle),
            SyncStatus::SyncingSuspended => Ok(SyncStatus::IdleSuspended),
            other => Err(other.invalid(SyncStatus::Idle)),
        }
    }

    /// `Idle -> Idle_Suspended`, `Syncing -> Syncing_Suspended`; idempotent
    pub fn suspend(self) -> Result<Self, DomainError> {
        match self {
            SyncStatus::Idle | SyncStatus::IdleSuspended => Ok(SyncStatus::IdleSuspended),
            SyncStatus::Syncing | SyncStatus::SyncingSuspended => {
                Ok(SyncStatus::SyncingSuspended)
            }
            SyncStatus::Init => Err(self.invalid(SyncStatus::IdleSuspended)),
        }
    }

    /// Reverse of [`SyncStatus::suspend`]; idempotent
    pub fn resume(self) -> Result<Self, DomainError> {
        match self {
            SyncStatus::IdleSuspended | SyncStatus::Idle => Ok(SyncStatus::Idle),
            SyncStatus::SyncingSuspended | SyncStatus::Syncing => Ok(SyncStatus::Syncing),
            SyncStatus::Init => Err(self.invalid(SyncStatus::Idle)),
        }
    }

    fn invalid(self, to: SyncStatus) -> DomainError {
        DomainError::InvalidState {
            from: self.name().to_string(),
            to: to.name().to_string(),
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which kind of pass was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    /// Periodic or forced: may run a full crawl
    Full,
    /// After local activity: watcher events then the change feed
    Partial,
}

impl std::fmt::Display for PassKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PassKind::Full => write!(f, "full"),
            PassKind::Partial => write!(f, "partial"),
        }
    }
}
