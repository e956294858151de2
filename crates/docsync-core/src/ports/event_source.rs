//! Local event source port
//!
//! The watcher reconciler consumes local filesystem events through this
//! interface. Implementations coalesce raw notifications per path and hand
//! them out in one atomic drain.

use crate::domain::fs_event::FsEvent;

/// A drainable, thread-safe queue of coalesced local events
///
/// ## Implementation Notes
///
/// - `drain` removes and returns everything queued so far in arrival order.
///   Events pushed concurrently land either in this drain or the next one.
/// - While disabled, incoming events are discarded. The orchestrator
///   disables the source while a pass writes to the local tree.
pub trait ILocalEventSource: Send + Sync {
    /// Removes and returns all queued events
    fn drain(&self) -> Vec<FsEvent>;

    /// Enables or disables event collection
    fn set_enabled(&self, enabled: bool);

    /// Whether events are currently collected
    fn is_enabled(&self) -> bool;

    /// Number of queued events
    fn pending_count(&self) -> usize;
}
