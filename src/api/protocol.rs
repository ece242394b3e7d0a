//! Order API Protocol
//!
//! Endpoints and response bodies of the public order API. The transfer DTOs are
//! shared with the cluster, which calls the same endpoint.

use crate::order::OrderId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use crate::cluster::protocol::{
    ENDPOINT_TRANSFER, ErrorResponse, TransferRequest, TransferResponse,
};

pub const ENDPOINT_ORDERS: &str = "/orders";
pub const ENDPOINT_ORDER: &str = "/orders/:id";
pub const ENDPOINT_WELCOME: &str = "/";

pub const WELCOME_MESSAGE: &str = "Welcome to the order processing service!";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    pub order_id: OrderId,
    pub start_time: DateTime<Utc>,
}
