//! Configuration Module
//!
//! Command line and environment configuration of the `order-cluster` binary,
//! plus the on-disk service identity.
//!
//! ## Subcommands
//! - **`serve`**: runs one order processing service (API, pipelines, cluster).
//! - **`store`**: runs the shared key-hash store that `serve` processes point at
//!   with `--store-url`.
//!
//! Every flag can also be set through an `ORDER_CLUSTER_*` environment variable.

pub mod cli;
pub mod identity;

pub use cli::{Cli, Command, ServeArgs, StoreArgs};
pub use identity::{SERVICE_ID_FILE, load_or_create_service_id};

#[cfg(test)]
mod tests;
