//! Order persistence.
//!
//! Two tables back every order:
//! - `Orders`: `order_id -> OrderRecord` blob.
//! - `OrderStateInService:<service_id>`: `order_id -> OwnershipEntry`, the ownership
//!   index consulted by startup reload and by transfers.

use super::types::*;
use crate::error::StoreError;
use crate::storage::Store;

use std::sync::Arc;

pub const ORDERS_TABLE: &str = "Orders";
pub const ORDER_STATE_IN_SERVICE_TABLE: &str = "OrderStateInService";

pub fn ownership_table(service_id: &str) -> String {
    format!("{}:{}", ORDER_STATE_IN_SERVICE_TABLE, service_id)
}

/// Typed access to orders and ownership entries on top of a [`Store`].
#[derive(Clone)]
pub struct OrderRepository {
    store: Arc<dyn Store>,
}

impl OrderRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Records a freshly created order as Active for its owner, then stores it.
    pub async fn register_new(&self, record: &OrderRecord) -> Result<(), StoreError> {
        self.set_ownership(
            &record.owning_service_id,
            &record.order_id,
            OrderStateInService::Active,
        )
        .await?;
        self.save(record).await
    }

    /// Persists `record` on behalf of its owning service.
    ///
    /// The write is refused unless the owner still holds the order as Active, so a
    /// service that lost the order to a transfer cannot overwrite the new owner's
    /// progress. A finished order flips its index entry to Completed.
    pub async fn save(&self, record: &OrderRecord) -> Result<(), StoreError> {
        let service_id = &record.owning_service_id;
        let state = self.ownership_state(service_id, &record.order_id).await?;

        if state != OrderStateInService::Active {
            return Err(StoreError::OwnershipLost {
                service_id: service_id.clone(),
                order_id: record.order_id.to_string(),
            });
        }

        let blob = serde_json::to_string(record)?;
        self.store
            .write(ORDERS_TABLE, record.order_id.as_str(), blob)
            .await?;

        let next_state = record.ownership_state();
        if next_state != OrderStateInService::Active {
            self.set_ownership(service_id, &record.order_id, next_state)
                .await?;
        }

        tracing::trace!(
            "[{}] saved at step {} (owner {})",
            record.order_id,
            record.current_step,
            service_id
        );

        Ok(())
    }

    /// Loads an order by its external id.
    pub async fn get(&self, order_id: &str) -> Result<OrderRecord, StoreError> {
        let order_id = OrderId::parse(order_id)?;
        let blob = self.store.read(ORDERS_TABLE, order_id.as_str()).await?;
        Ok(serde_json::from_str(&blob)?)
    }

    pub async fn ownership_state(
        &self,
        service_id: &str,
        order_id: &OrderId,
    ) -> Result<OrderStateInService, StoreError> {
        let blob = self
            .store
            .read(&ownership_table(service_id), order_id.as_str())
            .await?;
        let entry: OwnershipEntry = serde_json::from_str(&blob)?;
        Ok(entry.state)
    }

    pub async fn set_ownership(
        &self,
        service_id: &str,
        order_id: &OrderId,
        state: OrderStateInService,
    ) -> Result<(), StoreError> {
        let entry = OwnershipEntry {
            order_id: order_id.clone(),
            state,
        };
        let blob = serde_json::to_string(&entry)?;
        self.store
            .write(&ownership_table(service_id), order_id.as_str(), blob)
            .await?;

        tracing::debug!("[{}] ownership in {} -> {}", order_id, service_id, state);
        Ok(())
    }

    /// Every readable ownership entry of `service_id`.
    ///
    /// Entries that fail to parse are logged and skipped; a failed scan is an error.
    pub async fn scan_ownership(&self, service_id: &str) -> Result<Vec<OwnershipEntry>, StoreError> {
        let rows = self.store.scan(&ownership_table(service_id)).await?;

        let mut entries = Vec::with_capacity(rows.len());
        for (key, blob) in rows {
            match serde_json::from_str::<OwnershipEntry>(&blob) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(
                        "Skipping malformed ownership entry {} in {}: {}",
                        key,
                        service_id,
                        e
                    );
                }
            }
        }

        Ok(entries)
    }

    /// Ids of the orders `service_id` currently holds as Active.
    pub async fn active_orders(&self, service_id: &str) -> Result<Vec<OrderId>, StoreError> {
        Ok(self
            .scan_ownership(service_id)
            .await?
            .into_iter()
            .filter(|entry| entry.state == OrderStateInService::Active)
            .map(|entry| entry.order_id)
            .collect())
    }
}
