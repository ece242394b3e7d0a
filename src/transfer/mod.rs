//! Transfer Module
//!
//! Moves ownership of orders from one service to another and restarts them in
//! the receiving service's pipelines. The same routine reloads a service's own
//! Active orders at startup, where source and destination are the same service.
//!
//! ## Submodules
//! - **`service`**: the take-over routine and the `TransferService` wrapper
//!   invoked by the cluster leader and the HTTP API.

pub mod service;

pub use service::{OrderDispatcher, OrderTransfer, TransferReport, TransferService, take_over};

#[cfg(test)]
mod tests;
