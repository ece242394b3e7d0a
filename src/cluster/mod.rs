//! Cluster Module
//!
//! Membership, leader election and failure handling for the order services.
//!
//! ## Architecture
//! - **Consensus**: a replicated log whose only payload is membership (`Join`
//!   entries). It elects at most one leader per term and is persisted to
//!   `consensus.json` in the data directory.
//! - **Liveness**: the leader probes every peer's heartbeat endpoint. A peer whose
//!   last good probe is too old is marked offline once, and its orders are handed
//!   to a healthy service (or taken over locally).
//! - **Transport**: peers talk JSON over HTTP; the `ClusterTransport` trait keeps
//!   the service testable in-process.
//!
//! ## Submodules
//! - **`consensus`**: term, vote and log bookkeeping without I/O.
//! - **`persistence`**: durable consensus state.
//! - **`service`**: `ClusterService`, the loops and the public API.
//! - **`transport`**: the transport trait and its HTTP implementation.
//! - **`handlers`**: axum routes for RPCs, join and diagnostics.
//! - **`protocol`** / **`types`**: wire DTOs and shared types.

pub mod consensus;
pub mod handlers;
pub mod persistence;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod types;

pub use service::ClusterService;
pub use transport::{ClusterTransport, HttpTransport};
pub use types::{ClusterSettings, LeaderInfo, Member, Role};
