//! Clustered Order Processing Library
//!
//! This library crate defines the subsystems of an order processing service and
//! is the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! - **`order`**: the order record, its step state machine and its persistence.
//! - **`pipeline`**: sharded step pipelines that drive orders forward and roll
//!   them back after a failure.
//! - **`transfer`**: moves orders of a failed service to a healthy one.
//! - **`cluster`**: leader election, membership and peer liveness. The leader
//!   triggers transfers when a peer goes offline.
//! - **`storage`**: the key-hash store every service persists to.
//! - **`api`**: the HTTP surface for clients and operators.
//! - **`config`**: command line configuration and service identity.
//! - **`error`**: the error enums shared by the modules above.

pub mod api;
pub mod cluster;
pub mod config;
pub mod error;
pub mod order;
pub mod pipeline;
pub mod storage;
pub mod transfer;
