//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! sync engine. The core depends on these traits; their implementations
//! live in adapter crates or in the embedding application.
//!
//! ## Ports Overview
//!
//! - [`IRemoteStore`] - Remote document store the queue drains into
//! - [`ISyncStateRepository`] - Durable sync metadata and queue storage
//! - [`ILocalStore`] - The domain model's own entity storage
//! - [`IAuthProvider`] - Authentication gate and user scoping
//! - [`Clock`] - Time source

pub mod auth;
pub mod clock;
pub mod local_store;
pub mod remote_store;
pub mod state_repository;

pub use auth::IAuthProvider;
pub use clock::{Clock, ManualClock, SystemClock};
pub use local_store::ILocalStore;
pub use remote_store::{ApplyOutcome, IRemoteStore, RemoteEntry, RemoteError, RemoteRecord};
pub use state_repository::{
    EntityUpdate, ISyncStateRepository, MetadataUpdate, MetadataWrite, QueueChange,
    LAST_SYNC_COMPLETED_KEY,
};
