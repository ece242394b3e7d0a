//! Pipeline Manager
//!
//! Spreads the orders owned by this service over a fixed set of pipeline shards
//! and periodically retries jobs whose last save failed.

use super::registry::StepRegistry;
use super::shard::Pipeline;
use crate::error::{PipelineError, TransferError};
use crate::order::{OrderId, OrderRecord, OrderRepository};
use crate::transfer::{self, OrderDispatcher, TransferReport};

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Sizing of the shards owned by one manager.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub pipelines: usize,
    pub queue_capacity: usize,
    pub stall_retry: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            pipelines: 50,
            queue_capacity: super::handler::MAX_PENDING_TASKS,
            stall_retry: Duration::from_secs(30),
        }
    }
}

pub struct PipelineManager {
    service_id: String,
    repository: OrderRepository,
    pipelines: Vec<Arc<Pipeline>>,
    cursor: Mutex<usize>,
    stall_retry: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl PipelineManager {
    pub fn new(
        service_id: String,
        repository: OrderRepository,
        registry: Arc<StepRegistry>,
        settings: PipelineSettings,
    ) -> Arc<Self> {
        let pipelines = (0..settings.pipelines.max(1))
            .map(|id| {
                Pipeline::new(
                    id,
                    repository.clone(),
                    registry.clone(),
                    settings.queue_capacity,
                )
            })
            .collect();

        Arc::new(Self {
            service_id,
            repository,
            pipelines,
            cursor: Mutex::new(0),
            stall_retry: settings.stall_retry,
            sweeper: Mutex::new(None),
        })
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn repository(&self) -> &OrderRepository {
        &self.repository
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Starts every shard and the stall sweep, then reloads the orders this
    /// service still holds as Active.
    pub async fn start(self: &Arc<Self>) -> Result<TransferReport, TransferError> {
        for pipeline in &self.pipelines {
            pipeline.start();
        }

        let manager = self.clone();
        *self.sweeper.lock() = Some(tokio::spawn(async move {
            manager.stall_sweep_loop().await;
        }));

        tracing::info!(
            "Started {} pipelines for service {}",
            self.pipeline_count(),
            self.service_id
        );

        let report = transfer::take_over(
            &self.repository,
            &self.service_id,
            &self.service_id,
            self.as_ref(),
        )
        .await?;

        tracing::info!(
            "Reloaded {} active orders ({} skipped)",
            report.dispatched,
            report.skipped
        );
        Ok(report)
    }

    pub fn stop(&self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.abort();
        }
        for pipeline in &self.pipelines {
            pipeline.stop();
        }
    }

    /// Hands `record` to the next shard in round-robin order.
    pub async fn dispatch_order(&self, record: OrderRecord) -> Result<(), PipelineError> {
        if self.contains(&record.order_id) {
            return Err(PipelineError::DuplicateJob(record.order_id.to_string()));
        }

        let pipeline = self.next_pipeline();
        pipeline.append_job(record).await
    }

    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.pipelines.iter().any(|p| p.contains(order_id))
    }

    /// Jobs currently in flight across all shards.
    pub fn job_count(&self) -> usize {
        self.pipelines.iter().map(|p| p.job_count()).sum()
    }

    /// Retries stalled jobs on every shard. Returns how many were resumed.
    pub async fn resume_stalled(&self) -> usize {
        let mut resumed = 0;
        for pipeline in &self.pipelines {
            resumed += pipeline.resume_stalled().await;
        }
        resumed
    }

    fn next_pipeline(&self) -> Arc<Pipeline> {
        let mut cursor = self.cursor.lock();
        let pipeline = self.pipelines[*cursor % self.pipelines.len()].clone();
        *cursor = (*cursor + 1) % self.pipelines.len();
        pipeline
    }

    async fn stall_sweep_loop(&self) {
        let mut interval = tokio::time::interval(self.stall_retry);
        interval.tick().await;

        loop {
            interval.tick().await;

            let resumed = self.resume_stalled().await;
            if resumed > 0 {
                tracing::info!("Resumed {} stalled orders", resumed);
            }
        }
    }
}

#[async_trait]
impl OrderDispatcher for PipelineManager {
    async fn dispatch_order(&self, record: OrderRecord) -> Result<(), PipelineError> {
        PipelineManager::dispatch_order(self, record).await
    }
}
