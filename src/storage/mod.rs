//! Key-Hash Store Module
//!
//! A flat `table -> key -> blob` store with single-key writes and per-table scans.
//! There are no transactions and no cross-key atomicity; callers lean on the
//! "one active owner" invariant instead of store-side concurrency control.
//!
//! ## Backends
//! - **`memory`**: `MemoryStore`, an in-process `DashMap` of tables. Used by tests and
//!   single-node deployments, and as the backing map of the store server.
//! - **`remote`**: `HttpStore`, a client for a store server shared by every service
//!   in the cluster.
//! - **`handlers`**: the axum handlers that expose a `MemoryStore` over HTTP.

pub mod handlers;
pub mod memory;
pub mod protocol;
pub mod remote;
pub mod store;

pub use memory::MemoryStore;
pub use remote::HttpStore;
pub use store::{Blob, Store};

#[cfg(test)]
mod tests;
