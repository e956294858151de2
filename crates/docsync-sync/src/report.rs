//! Outcome of one reconciliation pass

use docsync_core::domain::ExceptionKind;

/// Counts of what a pass changed, plus the errors that failed it
///
/// A pass succeeds when no error was recorded. Skips (invalid names,
/// exhausted retries, local I/O problems) do not fail a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub uploads: u32,
    pub downloads: u32,
    pub remote_deletions: u32,
    pub local_deletions: u32,
    pub moves: u32,
    pub conflicts: u32,
    pub skipped: u32,
    pub errors: Vec<String>,
    /// Category of the first recorded error
    pub failure_kind: Option<ExceptionKind>,
}

impl PassReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Records an error that fails the pass
    pub fn fail(&mut self, kind: ExceptionKind, message: impl Into<String>) {
        self.failure_kind.get_or_insert(kind);
        self.errors.push(message.into());
    }

    pub fn merge(&mut self, other: PassReport) {
        self.uploads += other.uploads;
        self.downloads += other.downloads;
        self.remote_deletions += other.remote_deletions;
        self.local_deletions += other.local_deletions;
        self.moves += other.moves;
        self.conflicts += other.conflicts;
        self.skipped += other.skipped;
        if let Some(kind) = other.failure_kind {
            self.failure_kind.get_or_insert(kind);
        }
        self.errors.extend(other.errors);
    }

    /// Number of side effects applied on either tree
    pub fn changes(&self) -> u32 {
        self.uploads
            + self.downloads
            + self.remote_deletions
            + self.local_deletions
            + self.moves
            + self.conflicts
    }
}
