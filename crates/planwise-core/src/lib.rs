//! Planwise Core - Domain model and ports of the offline-first sync engine
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `SyncMetadata`, `SyncQueueItem`, `ConflictResolution`, `PassResult`
//! - **Port definitions** - Traits for adapters: `IRemoteStore`, `ISyncStateRepository`,
//!   `ILocalStore`, `IAuthProvider`, `Clock`
//! - **State machine** - Per-entity sync status transitions
//! - **Configuration** - YAML-backed settings with validation
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement; the
//! reconciliation engine in `planwise-sync` drives the domain through them.

pub mod config;
pub mod domain;
pub mod ports;
