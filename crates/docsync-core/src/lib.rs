//! docsync Core - Domain types, ports and configuration
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `SyncItem`, `RemoteObject`, change and filesystem events,
//!   the `SyncStatus` state machine and the `SyncEvent` stream items
//! - **Port definitions** - Traits for adapters: `IRemoteRepository`, `IStateStore`,
//!   `ILocalFileSystem`, `ILocalEventSource`, `INotificationService`
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! # Architecture
//!
//! The domain module contains pure data types with no I/O.
//! Ports define trait interfaces that adapter crates implement; the
//! reconcilers in `docsync-sync` only ever talk to these traits.

pub mod config;
pub mod domain;
pub mod ports;
