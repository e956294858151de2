//! Integration tests for docsync-sync
//!
//! Runs the reconcilers and the orchestrator against the in-memory
//! repository, the in-memory state store and a temporary local tree.

mod common;

mod test_changelog;
mod test_crawl;
mod test_orchestrator;
mod test_watcher;
