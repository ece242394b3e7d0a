use crate::error::{PipelineError, StoreError, TransferError};
use crate::order::{OrderId, OrderRecord, OrderRepository, OrderStateInService};

use async_trait::async_trait;
use std::sync::Arc;

/// Something that can start processing a loaded order.
#[async_trait]
pub trait OrderDispatcher: Send + Sync {
    async fn dispatch_order(&self, record: OrderRecord) -> Result<(), PipelineError>;
}

/// Something that can take over the orders of a (possibly failed) service.
#[async_trait]
pub trait OrderTransfer: Send + Sync {
    async fn transfer(&self, source_service_id: &str) -> Result<TransferReport, TransferError>;
}

/// Outcome of one take-over run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// Active entries found in the source index.
    pub scanned: usize,
    /// Orders handed to the dispatcher.
    pub dispatched: usize,
    /// Orders that could not be loaded, re-owned or dispatched.
    pub skipped: usize,
}

/// Takes over every order `source` holds as Active and dispatches it in `current`.
///
/// When the two services differ, the source entry is marked Transferred before
/// the current one is marked Active. A failure on one order is logged and the
/// rest still run; only a failed scan aborts the whole run.
pub async fn take_over(
    repository: &OrderRepository,
    current: &str,
    source: &str,
    dispatcher: &dyn OrderDispatcher,
) -> Result<TransferReport, TransferError> {
    let active = repository.active_orders(source).await?;
    let mut report = TransferReport {
        scanned: active.len(),
        ..TransferReport::default()
    };

    if current != source {
        tracing::info!(
            "Service {} taking over {} orders from {}",
            current,
            active.len(),
            source
        );
    }

    for order_id in active {
        let mut record = match repository.get(order_id.as_str()).await {
            Ok(record) => record,
            Err(e) => {
                tracing::error!("[{}] cannot load for take-over: {}", order_id, e);
                report.skipped += 1;
                continue;
            }
        };

        if current != source {
            if let Err(e) = reassign(repository, &order_id, source, current).await {
                tracing::error!("[{}] cannot move ownership to {}: {}", order_id, current, e);
                report.skipped += 1;
                continue;
            }
        }

        record.owning_service_id = current.to_string();

        match dispatcher.dispatch_order(record).await {
            Ok(()) => report.dispatched += 1,
            Err(e) => {
                tracing::error!("[{}] cannot dispatch: {}", order_id, e);
                report.skipped += 1;
            }
        }
    }

    Ok(report)
}

async fn reassign(
    repository: &OrderRepository,
    order_id: &OrderId,
    source: &str,
    current: &str,
) -> Result<(), StoreError> {
    repository
        .set_ownership(source, order_id, OrderStateInService::Transferred)
        .await?;
    repository
        .set_ownership(current, order_id, OrderStateInService::Active)
        .await
}

/// Transfer entry point bound to the local service.
pub struct TransferService {
    service_id: String,
    repository: OrderRepository,
    dispatcher: Arc<dyn OrderDispatcher>,
}

impl TransferService {
    pub fn new(
        service_id: String,
        repository: OrderRepository,
        dispatcher: Arc<dyn OrderDispatcher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            service_id,
            repository,
            dispatcher,
        })
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }
}

#[async_trait]
impl OrderTransfer for TransferService {
    async fn transfer(&self, source_service_id: &str) -> Result<TransferReport, TransferError> {
        let report = take_over(
            &self.repository,
            &self.service_id,
            source_service_id,
            self.dispatcher.as_ref(),
        )
        .await?;

        tracing::info!(
            "Transfer from {} done: {} dispatched, {} skipped",
            source_service_id,
            report.dispatched,
            report.skipped
        );
        Ok(report)
    }
}
