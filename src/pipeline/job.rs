use crate::error::StoreError;
use crate::order::{OrderId, OrderRecord, OrderRepository};

use std::sync::Arc;
use tokio::sync::Mutex;

/// A job shared between a pipeline's registry and the handler currently holding it.
///
/// The step protocol guarantees a single holder at a time, so the lock is never
/// contended for long.
pub type SharedJob = Arc<Mutex<ProcessJob>>;

/// One order being processed by a pipeline shard.
pub struct ProcessJob {
    pub record: OrderRecord,
    repository: OrderRepository,
}

impl ProcessJob {
    pub fn new(record: OrderRecord, repository: OrderRepository) -> Self {
        Self { record, repository }
    }

    pub fn shared(self) -> SharedJob {
        Arc::new(Mutex::new(self))
    }

    pub fn order_id(&self) -> &OrderId {
        &self.record.order_id
    }

    /// Writes the record through the repository's single-writer guard.
    pub async fn persist(&self) -> Result<(), StoreError> {
        self.repository.save(&self.record).await
    }
}
