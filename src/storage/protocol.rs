//! Store Network Protocol
//!
//! Endpoints and DTOs used between `HttpStore` clients and the store server.

use serde::{Deserialize, Serialize};

/// Prefix of every store endpoint: `/store/{table}` and `/store/{table}/{key}`.
pub const ENDPOINT_STORE: &str = "/store";

#[derive(Debug, Serialize, Deserialize)]
pub struct WriteRequest {
    pub blob: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WriteResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadResponse {
    /// `None` when the key does not exist.
    pub blob: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScanEntry {
    pub key: String,
    pub blob: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScanResponse {
    pub table: String,
    pub entries: Vec<ScanEntry>,
}
