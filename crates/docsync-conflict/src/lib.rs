//! docsync Conflict - Conflict detection and resolution
//!
//! Provides:
//! - Timestamp/checksum based conflict detection
//! - A policy table (copy-name suffix, probe limit, nag threshold, per-path winners)
//! - Collision-free conflict copy names
//! - The resolver that preserves local edits before the remote copy is fetched
//! - A tracker that nags about conflict copies left behind

pub mod detector;
pub mod error;
pub mod namer;
pub mod nag;
pub mod policy;
pub mod resolver;

pub use detector::ConflictDetector;
pub use error::ConflictError;
pub use nag::StaleConflictTracker;
pub use namer::ConflictNamer;
pub use policy::{ConflictPolicy, ConflictRule, Winner};
pub use resolver::ConflictResolver;
