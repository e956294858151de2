//! File watching and the coalescing event queue
//!
//! Provides a [`FileWatcher`] that wraps the `notify` crate to monitor the
//! local root, converting raw OS events into [`FsEvent`] values.
//!
//! The [`CoalescingEventQueue`] collapses successive events for the same
//! path into one and hands everything out in a single atomic drain. Every
//! push wakes the scheduler's debounce timer.
//!
//! ## Architecture
//!
//! ```text
//! inotify / fanotify
//!       │
//!       ▼
//!  FileWatcher  ──→  CoalescingEventQueue  ──→  WatcherReconciler
//!                           │
//!                           └── Notify ──→  SyncScheduler (debounce)
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::Notify;
use tracing::{debug, error, info};

use docsync_core::domain::fs_event::{FsEvent, FsEventKind};
use docsync_core::ports::ILocalEventSource;

// ============================================================================
// CoalescingEventQueue
// ============================================================================

#[derive(Debug, Default)]
struct Pending {
    /// Latest event per path, with the sequence number of its first arrival
    events: HashMap<PathBuf, (u64, FsEvent)>,
    seq: u64,
}

impl Pending {
    fn insert(&mut self, seq: u64, event: FsEvent) {
        self.events.insert(event.path.clone(), (seq, event));
    }

    fn push(&mut self, event: FsEvent) {
        self.seq += 1;
        let seq = self.seq;

        // A rename out of a path that was only just created carries the
        // creation along.
        if let FsEventKind::Renamed { old_path } = &event.kind {
            if let Some((first, FsEvent {
                kind: FsEventKind::Created,
                ..
            })) = self.events.get(old_path).cloned()
            {
                self.events.remove(old_path);
                self.insert(first, FsEvent::created(event.path));
                return;
            }
        }

        let Some((first, previous)) = self.events.remove(&event.path) else {
            self.insert(seq, event);
            return;
        };

        match (&previous.kind, &event.kind) {
            (FsEventKind::Created, FsEventKind::Deleted) => {}
            (FsEventKind::Deleted, FsEventKind::Created) => {
                self.insert(first, FsEvent::changed(event.path));
            }
            (FsEventKind::Renamed { .. }, FsEventKind::Changed) => {
                self.insert(first, previous);
            }
            (FsEventKind::Renamed { old_path }, FsEventKind::Deleted) => {
                self.insert(first, FsEvent::deleted(old_path.clone()));
            }
            _ => self.insert(first, event),
        }
    }

    fn drain(&mut self) -> Vec<FsEvent> {
        let mut events: Vec<(u64, FsEvent)> = self.events.drain().map(|(_, v)| v).collect();
        events.sort_by_key(|(seq, _)| *seq);
        events.into_iter().map(|(_, event)| event).collect()
    }
}

/// Thread-safe queue of coalesced local events
///
/// Coalescing rules for a second event on the same path:
/// - Created then Deleted drops the entry
/// - Deleted then Created becomes Changed
/// - Renamed then Changed stays Renamed
/// - Renamed(a → b) then Deleted(b) becomes Deleted(a)
/// - Created(a) then Renamed(a → b) becomes Created(b)
/// - otherwise the latest event wins
///
/// Paths keep the position of their first arrival.
#[derive(Debug)]
pub struct CoalescingEventQueue {
    pending: Mutex<Pending>,
    enabled: AtomicBool,
    activity: Arc<Notify>,
}

impl Default for CoalescingEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CoalescingEventQueue {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Pending::default()),
            enabled: AtomicBool::new(true),
            activity: Arc::new(Notify::new()),
        }
    }

    /// Adds an event; discarded while the queue is disabled
    pub fn push(&self, event: FsEvent) {
        if !self.is_enabled() {
            debug!(event = %event, "Event source disabled, dropping event");
            return;
        }
        debug!(event = %event, "Enqueuing local event");
        if let Ok(mut pending) = self.pending.lock() {
            pending.push(event);
        }
        self.activity.notify_one();
    }

    /// Signalled on every accepted push
    pub fn activity(&self) -> Arc<Notify> {
        Arc::clone(&self.activity)
    }
}

impl ILocalEventSource for CoalescingEventQueue {
    fn drain(&self) -> Vec<FsEvent> {
        let events = self
            .pending
            .lock()
            .map(|mut pending| pending.drain())
            .unwrap_or_default();
        if !events.is_empty() {
            debug!(count = events.len(), "Drained local events");
        }
        events
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.events.len()).unwrap_or(0)
    }
}

// ============================================================================
// FileWatcher
// ============================================================================

/// Watches the local root using the OS-native mechanism
///
/// On Linux this uses inotify. Events are mapped to [`FsEvent`]s and pushed
/// straight into the shared queue from notify's callback thread.
///
/// ## Usage
///
/// ```ignore
/// let queue = Arc::new(CoalescingEventQueue::new());
/// let mut watcher = FileWatcher::new(Arc::clone(&queue))?;
/// watcher.watch(Path::new("/home/user/DocSync"))?;
/// ```
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    watched: Vec<PathBuf>,
}

impl FileWatcher {
    /// Creates a watcher feeding `queue`
    ///
    /// # Errors
    /// Returns an error if the underlying OS watcher cannot be created
    pub fn new(queue: Arc<CoalescingEventQueue>) -> Result<Self> {
        info!("Initializing file watcher");

        let watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if let Some(change) = map_notify_event(&event) {
                        queue.push(change);
                    }
                }
                Err(err) => {
                    error!(error = %err, "File watcher error");
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create file watcher")?;

        Ok(Self {
            watcher,
            watched: Vec::new(),
        })
    }

    /// Starts watching a directory recursively
    ///
    /// # Errors
    /// Returns an error if the path cannot be watched (e.g., does not exist,
    /// insufficient permissions, or inotify watch limit reached)
    pub fn watch(&mut self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "Starting recursive watch");

        self.watcher
            .watch(path, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch path: {}", path.display()))?;
        self.watched.push(path.to_path_buf());
        Ok(())
    }

    /// Stops watching a directory
    ///
    /// # Errors
    /// Returns an error if the path was not being watched
    pub fn unwatch(&mut self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "Stopping watch");

        self.watcher
            .unwatch(path)
            .with_context(|| format!("Failed to unwatch path: {}", path.display()))?;
        self.watched.retain(|p| p != path);
        Ok(())
    }

    /// Paths currently watched
    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }
}

// ============================================================================
// Event mapping - notify::Event → FsEvent
// ============================================================================

/// Converts a `notify::Event` into an [`FsEvent`]
///
/// - `Create(*)` and `Modify(Name(To))` → Created
/// - `Modify(Name(Both))` with 2 paths → Renamed
/// - `Remove(*)` and `Modify(Name(From))` → Deleted
/// - other `Modify(*)` → Changed
///
/// Access events and events without paths are ignored.
fn map_notify_event(event: &notify::Event) -> Option<FsEvent> {
    let paths = &event.paths;
    let first = paths.first()?.clone();

    let mapped = match &event.kind {
        EventKind::Create(_) => FsEvent::created(first),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match paths.get(1) {
            Some(new) => FsEvent::renamed(first, new.clone()),
            None => FsEvent::changed(first),
        },
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => FsEvent::created(first),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => FsEvent::deleted(first),
        EventKind::Modify(_) => FsEvent::changed(first),
        EventKind::Remove(_) => FsEvent::deleted(first),
        _ => {
            debug!(kind = ?event.kind, "Ignoring event kind");
            return None;
        }
    };
    debug!(event = %mapped, "Mapped notify event");
    Some(mapped)
}

// ============================================================================
// Unit tests
// ============================================================================
