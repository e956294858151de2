//! Reminders for conflict copies left behind
//!
//! The crawl reports every local file name it walks past. Conflict copies
//! are counted per completed crawl; once a copy has been present for the
//! policy's threshold of passes a reminder is due, and again every
//! threshold passes after that until the user deals with it.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use docsync_core::domain::newtypes::SyncPath;

use crate::namer::ConflictNamer;

#[derive(Debug, Default)]
struct Passes {
    counts: HashMap<SyncPath, u32>,
    current: HashSet<SyncPath>,
}

/// Counts how many consecutive crawls saw each conflict copy
#[derive(Debug)]
pub struct StaleConflictTracker {
    namer: ConflictNamer,
    threshold: u32,
    passes: Mutex<Passes>,
}

impl StaleConflictTracker {
    pub fn new(namer: ConflictNamer, threshold: u32) -> Self {
        Self {
            namer,
            threshold: threshold.max(1),
            passes: Mutex::new(Passes::default()),
        }
    }

    /// Records a local file seen by the current crawl
    ///
    /// Returns true if the name is a conflict copy.
    pub fn observe(&self, path: &SyncPath) -> bool {
        let is_copy = path
            .file_name()
            .is_some_and(|name| self.namer.is_conflict_copy(name));
        if is_copy {
            if let Ok(mut passes) = self.passes.lock() {
                passes.current.insert(path.clone());
            }
        }
        is_copy
    }

    /// Closes a completed crawl
    ///
    /// Copies not seen in this crawl are forgotten. Returns the copies that
    /// are due for a reminder together with their pass counts.
    pub fn finish_pass(&self) -> Vec<(SyncPath, u32)> {
        let Ok(mut passes) = self.passes.lock() else {
            return Vec::new();
        };
        let current = std::mem::take(&mut passes.current);
        passes.counts.retain(|path, _| current.contains(path));

        let mut due = Vec::new();
        for path in current {
            let count = passes.counts.entry(path.clone()).or_insert(0);
            *count += 1;
            if *count >= self.threshold && (*count - self.threshold) % self.threshold == 0 {
                due.push((path, *count));
            }
        }
        due.sort();
        due
    }

    /// Discards observations of a crawl that did not complete
    pub fn abandon_pass(&self) {
        if let Ok(mut passes) = self.passes.lock() {
            passes.current.clear();
        }
    }

    /// Number of conflict copies currently tracked
    pub fn tracked(&self) -> usize {
        self.passes.lock().map(|p| p.counts.len()).unwrap_or(0)
    }
}
