//! Order API Module
//!
//! The public HTTP surface of a service: order creation and lookup, the transfer
//! trigger used by the cluster leader, and a welcome route. The cluster's own
//! routes are merged in by [`app`] so one listener serves both.
//!
//! ## Authentication
//! Every order and transfer endpoint requires an `Authorization` header. The
//! header value is resolved to a user through a [`TokenResolver`]; a missing or
//! rejected token answers 401.
//!
//! ## Submodules
//! - **`auth`**: token resolution seam and the passthrough resolver.
//! - **`handlers`**: axum handlers and the [`ApiState`] they share.
//! - **`protocol`**: endpoint paths and response bodies.

pub mod auth;
pub mod handlers;
pub mod protocol;

pub use auth::{PassthroughResolver, TokenInfo, TokenResolver};
pub use handlers::{ApiState, router};

use crate::cluster::ClusterService;
use axum::Router;
use std::sync::Arc;

/// The full router of a `serve` process.
pub fn app(state: Arc<ApiState>, cluster: Arc<ClusterService>) -> Router {
    router(state).merge(crate::cluster::handlers::router(cluster))
}

#[cfg(test)]
mod tests;
