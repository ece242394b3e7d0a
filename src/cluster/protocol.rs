//! Cluster Network Protocol
//!
//! Endpoints and DTOs exchanged between cluster members over HTTP.

use super::types::LogEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ENDPOINT_VOTE: &str = "/raft/vote";
pub const ENDPOINT_APPEND: &str = "/raft/append";
pub const ENDPOINT_JOIN: &str = "/cluster/join";
pub const ENDPOINT_HEARTBEAT: &str = "/diagnostic/heartbeat";
pub const ENDPOINT_DESCRIBE: &str = "/diagnostic/cluster";
pub const ENDPOINT_TRANSFER: &str = "/service/transfer";

/// Token the leader presents when asking a peer to take over orders.
pub const CLUSTER_TOKEN: &str = "user";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRequest {
    pub term: u64,
    pub candidate_id: String,
    pub last_log_index: u64,
    pub last_log_term: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteResponse {
    pub term: u64,
    pub vote_granted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendRequest {
    pub term: u64,
    pub leader_id: String,
    pub leader_address: String,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    pub entries: Vec<LogEntry>,
    pub leader_commit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendResponse {
    pub term: u64,
    pub success: bool,
    /// On success the last replicated index; on failure the follower's last index.
    pub match_index: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub service_id: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinResponse {
    pub leader_id: String,
    pub index: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub service_name: String,
    pub service_id: String,
    pub version: String,
    pub status: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerDescription {
    pub service_id: String,
    pub address: String,
    pub online: bool,
    pub consecutive_failures: u32,
    pub last_activity_ms_ago: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterDescription {
    pub service_id: String,
    pub leader: Option<String>,
    pub term: u64,
    pub commit_index: u64,
    pub peers: Vec<PeerDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub service_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResponse {
    pub transferred_service_id: String,
    pub current_service_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
