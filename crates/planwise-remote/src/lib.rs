//! Planwise Remote - HTTP document store adapter
//!
//! Provides the driven adapters the sync engine talks to when a real
//! backend is configured:
//! - [`HttpRemoteStore`] implements `IRemoteStore` over a JSON document API
//! - [`TokenAuth`] implements `IAuthProvider` from a user id and bearer token
//!
//! ## Modules
//!
//! - [`auth`] - Bearer token credentials
//! - [`client`] - HTTP client, URL construction and error classification
//! - [`store`] - The remote store port implementation

pub mod auth;
pub mod client;
pub mod store;

pub use auth::TokenAuth;
pub use client::RemoteClient;
pub use store::HttpRemoteStore;
