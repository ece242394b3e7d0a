use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Role of the local node in the current term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

/// Replicated command. Membership is the set of every `Join` in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Join { service_id: String, address: String },
    /// Appended by a new leader to commit an entry of its own term.
    Noop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub term: u64,
    pub index: u64,
    pub command: Command,
}

/// The part of the consensus state that must survive a restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentState {
    pub current_term: u64,
    pub voted_for: Option<String>,
    pub log: Vec<LogEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub service_id: String,
    pub address: String,
}

/// Who leads the cluster, as last observed by this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderInfo {
    pub service_id: String,
    pub address: String,
    pub term: u64,
}

/// Liveness bookkeeping for one peer, kept by the leader.
#[derive(Debug, Clone)]
pub struct PeerHealth {
    pub address: String,
    pub last_activity: Instant,
    pub consecutive_failures: u32,
    pub online: bool,
}

impl PeerHealth {
    pub fn new(address: String) -> Self {
        Self {
            address,
            last_activity: Instant::now(),
            consecutive_failures: 0,
            online: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClusterSettings {
    /// Leader append-entries period; also the unit of the election timeout.
    pub heartbeat: Duration,
    /// A peer is offline once it failed this many probes in a row and nothing was
    /// heard from it for `heartbeat * max_missed_heartbeats`.
    pub max_missed_heartbeats: u32,
    pub liveness_interval: Duration,
    /// Where `consensus.json` lives. `None` keeps the consensus state in memory.
    pub data_dir: Option<PathBuf>,
}

impl ClusterSettings {
    pub fn offline_after(&self) -> Duration {
        self.heartbeat * self.max_missed_heartbeats
    }

    pub fn commit_timeout(&self) -> Duration {
        self.heartbeat * 20
    }
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_millis(500),
            max_missed_heartbeats: 5,
            liveness_interval: Duration::from_secs(10),
            data_dir: None,
        }
    }
}

/// Turns `host:port` into a base URL; values that already carry a scheme are kept.
pub fn base_url(address: &str) -> String {
    let address = address.trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}
