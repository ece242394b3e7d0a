use crate::cluster::ClusterSettings;
use crate::pipeline::PipelineSettings;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Clustered order processing service.
#[derive(Debug, Parser)]
#[command(name = "order-cluster", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run an order processing service
    Serve(ServeArgs),
    /// Run the shared key-hash store
    Store(StoreArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    #[arg(long, env = "ORDER_CLUSTER_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "ORDER_CLUSTER_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Address other members use to reach this service (defaults to host:port)
    #[arg(long, env = "ORDER_CLUSTER_ADVERTISE")]
    pub advertise: Option<String>,

    /// Holds the service id and the consensus state
    #[arg(long, env = "ORDER_CLUSTER_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Any member of an existing cluster, as host:port
    #[arg(long, env = "ORDER_CLUSTER_JOIN")]
    pub join: Option<String>,

    /// Shared store server; an in-process store is used when absent
    #[arg(long, env = "ORDER_CLUSTER_STORE_URL")]
    pub store_url: Option<String>,

    #[arg(long, env = "ORDER_CLUSTER_PIPELINES", default_value_t = 50)]
    pub pipelines: usize,

    /// Simulated duration of every step
    #[arg(long, env = "ORDER_CLUSTER_STEP_DELAY_MS", default_value_t = 5000)]
    pub step_delay_ms: u64,

    /// Chance that a simulated step fails
    #[arg(
        long,
        env = "ORDER_CLUSTER_FAILURE_PERCENT",
        default_value_t = 5,
        value_parser = clap::value_parser!(u8).range(0..=100)
    )]
    pub failure_percent: u8,

    #[arg(long, env = "ORDER_CLUSTER_HEARTBEAT_MS", default_value_t = 500)]
    pub heartbeat_ms: u64,

    #[arg(long, env = "ORDER_CLUSTER_MAX_MISSED_HEARTBEATS", default_value_t = 5)]
    pub max_missed_heartbeats: u32,

    #[arg(long, env = "ORDER_CLUSTER_LIVENESS_INTERVAL_SECS", default_value_t = 10)]
    pub liveness_interval_secs: u64,

    #[arg(long, env = "ORDER_CLUSTER_STALL_RETRY_SECS", default_value_t = 30)]
    pub stall_retry_secs: u64,

    #[arg(long, env = "ORDER_CLUSTER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl ServeArgs {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn advertised_addr(&self) -> String {
        self.advertise.clone().unwrap_or_else(|| self.listen_addr())
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    pub fn failure_ratio(&self) -> f64 {
        f64::from(self.failure_percent) / 100.0
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            pipelines: self.pipelines,
            stall_retry: Duration::from_secs(self.stall_retry_secs),
            ..PipelineSettings::default()
        }
    }

    pub fn cluster_settings(&self) -> ClusterSettings {
        ClusterSettings {
            heartbeat: Duration::from_millis(self.heartbeat_ms),
            max_missed_heartbeats: self.max_missed_heartbeats,
            liveness_interval: Duration::from_secs(self.liveness_interval_secs),
            data_dir: Some(self.data_dir.clone()),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    #[arg(long, env = "ORDER_CLUSTER_STORE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "ORDER_CLUSTER_STORE_PORT", default_value_t = 6380)]
    pub port: u16,

    #[arg(long, env = "ORDER_CLUSTER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl StoreArgs {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Command {
    pub fn log_level(&self) -> &str {
        match self {
            Command::Serve(args) => &args.log_level,
            Command::Store(args) => &args.log_level,
        }
    }
}
