//! Transfer Module Tests
//!
//! ## Test Scopes
//! - **Take-over**: ownership index rewrites and dispatch of the moved orders.
//! - **Reload**: a service re-dispatching its own Active orders.
//! - **Failure isolation**: one broken order does not stop the others.

#[cfg(test)]
mod tests {
    use crate::error::{PipelineError, StoreError};
    use crate::order::{NewOrder, OrderRecord, OrderRepository, OrderStateInService};
    use crate::order::repository::ownership_table;
    use crate::storage::{MemoryStore, Store};
    use crate::transfer::{OrderDispatcher, OrderTransfer, TransferService, take_over};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Dispatcher that only remembers what it was handed.
    #[derive(Default)]
    struct RecordingDispatcher {
        dispatched: Mutex<Vec<OrderRecord>>,
        reject: bool,
    }

    #[async_trait]
    impl OrderDispatcher for RecordingDispatcher {
        async fn dispatch_order(&self, record: OrderRecord) -> Result<(), PipelineError> {
            if self.reject {
                return Err(PipelineError::DuplicateJob(record.order_id.to_string()));
            }
            self.dispatched.lock().push(record);
            Ok(())
        }
    }

    fn repository() -> (MemoryStore, OrderRepository) {
        let store = MemoryStore::new();
        let repository = OrderRepository::new(Arc::new(store.clone()));
        (store, repository)
    }

    async fn active_order(repository: &OrderRepository, service_id: &str) -> OrderRecord {
        let record = OrderRecord::create(NewOrder {
            user_id: Some("u1".to_string()),
            owning_service_id: service_id.to_string(),
        })
        .unwrap();
        repository.register_new(&record).await.unwrap();
        record
    }

    // ============================================================
    // TEST 1: Take-over between two services
    // ============================================================

    #[tokio::test]
    async fn test_transfer_moves_ownership_and_dispatches() {
        // ARRANGE: service A owns an active order, A is considered gone
        let (_store, repository) = repository();
        let record = active_order(&repository, "service-a").await;
        let dispatcher = RecordingDispatcher::default();

        // ACT: B takes over A's orders
        let report = take_over(&repository, "service-b", "service-a", &dispatcher)
            .await
            .unwrap();

        // ASSERT: dispatched into B with B as owner
        assert_eq!(report.scanned, 1);
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.skipped, 0);

        let dispatched = dispatcher.dispatched.lock();
        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].order_id, record.order_id);
        assert_eq!(dispatched[0].owning_service_id, "service-b");

        // ASSERT: ownership index shows B Active, A Transferred
        assert_eq!(
            repository
                .ownership_state("service-b", &record.order_id)
                .await
                .unwrap(),
            OrderStateInService::Active
        );
        assert_eq!(
            repository
                .ownership_state("service-a", &record.order_id)
                .await
                .unwrap(),
            OrderStateInService::Transferred
        );
    }

    #[tokio::test]
    async fn test_transferred_order_rejects_writes_from_old_owner() {
        // ARRANGE
        let (_store, repository) = repository();
        let record = active_order(&repository, "service-a").await;
        let dispatcher = RecordingDispatcher::default();

        take_over(&repository, "service-b", "service-a", &dispatcher)
            .await
            .unwrap();

        // ACT: A still tries to save its stale copy
        let result = repository.save(&record).await;

        // ASSERT
        assert!(matches!(result, Err(StoreError::OwnershipLost { .. })));
    }

    #[tokio::test]
    async fn test_transfer_skips_completed_and_transferred_orders() {
        // ARRANGE: one active, one completed, one already transferred
        let (_store, repository) = repository();
        let active = active_order(&repository, "service-a").await;
        let completed = active_order(&repository, "service-a").await;
        let moved = active_order(&repository, "service-a").await;

        repository
            .set_ownership("service-a", &completed.order_id, OrderStateInService::Completed)
            .await
            .unwrap();
        repository
            .set_ownership("service-a", &moved.order_id, OrderStateInService::Transferred)
            .await
            .unwrap();

        let dispatcher = RecordingDispatcher::default();

        // ACT
        let report = take_over(&repository, "service-b", "service-a", &dispatcher)
            .await
            .unwrap();

        // ASSERT: only the active order moved
        assert_eq!(report.scanned, 1);
        let dispatched = dispatcher.dispatched.lock();
        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].order_id, active.order_id);
    }

    // ============================================================
    // TEST 2: Reload of a service's own orders
    // ============================================================

    #[tokio::test]
    async fn test_reload_keeps_ownership_untouched() {
        // ARRANGE
        let (store, repository) = repository();
        let record = active_order(&repository, "service-a").await;
        let dispatcher = RecordingDispatcher::default();

        // ACT
        let report = take_over(&repository, "service-a", "service-a", &dispatcher)
            .await
            .unwrap();

        // ASSERT: dispatched, still Active, no Transferred entry written
        assert_eq!(report.dispatched, 1);
        assert_eq!(
            repository
                .ownership_state("service-a", &record.order_id)
                .await
                .unwrap(),
            OrderStateInService::Active
        );
        assert_eq!(store.scan(&ownership_table("service-a")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transfer_from_unknown_service_is_empty() {
        let (_store, repository) = repository();
        let dispatcher = RecordingDispatcher::default();

        let report = take_over(&repository, "service-b", "nobody", &dispatcher)
            .await
            .unwrap();

        assert_eq!(report, Default::default());
    }

    // ============================================================
    // TEST 3: Failure isolation
    // ============================================================

    #[tokio::test]
    async fn test_missing_order_blob_is_skipped() {
        // ARRANGE: index entry without an order record behind it
        let (_store, repository) = repository();
        let orphan = crate::order::OrderId::new();
        repository
            .set_ownership("service-a", &orphan, OrderStateInService::Active)
            .await
            .unwrap();
        let record = active_order(&repository, "service-a").await;

        let dispatcher = RecordingDispatcher::default();

        // ACT
        let report = take_over(&repository, "service-b", "service-a", &dispatcher)
            .await
            .unwrap();

        // ASSERT: the real order still moved
        assert_eq!(report.scanned, 2);
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(dispatcher.dispatched.lock()[0].order_id, record.order_id);
    }

    #[tokio::test]
    async fn test_dispatch_rejection_is_counted() {
        let (_store, repository) = repository();
        active_order(&repository, "service-a").await;

        let dispatcher = RecordingDispatcher {
            reject: true,
            ..Default::default()
        };

        let report = take_over(&repository, "service-b", "service-a", &dispatcher)
            .await
            .unwrap();

        assert_eq!(report.dispatched, 0);
        assert_eq!(report.skipped, 1);
    }

    // ============================================================
    // TEST 4: TransferService
    // ============================================================

    #[tokio::test]
    async fn test_transfer_service_uses_its_own_id() {
        // ARRANGE
        let (_store, repository) = repository();
        let record = active_order(&repository, "service-a").await;
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let service = TransferService::new(
            "service-b".to_string(),
            repository.clone(),
            dispatcher.clone(),
        );

        // ACT
        let report = service.transfer("service-a").await.unwrap();

        // ASSERT
        assert_eq!(report.dispatched, 1);
        assert_eq!(service.service_id(), "service-b");
        assert_eq!(
            repository
                .ownership_state("service-b", &record.order_id)
                .await
                .unwrap(),
            OrderStateInService::Active
        );
    }
}
