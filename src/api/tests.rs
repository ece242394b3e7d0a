//! API Module Tests
//!
//! Drives the order API routes in-process with `oneshot`.
//!
//! ## Test Scopes
//! - **Auth**: token resolution and 401 answers.
//! - **Orders**: creation, lookup and body validation.
//! - **Transfer**: the trigger answers at once and runs the take-over.

#[cfg(test)]
mod tests {
    use crate::api::auth::{PassthroughResolver, TokenResolver};
    use crate::api::handlers::{ApiState, router};
    use crate::api::protocol::{CreateOrderResponse, TransferResponse, WELCOME_MESSAGE};
    use crate::error::{AuthError, PipelineError, TransferError};
    use crate::order::{
        NewOrder, OrderRecord, OrderRepository, OrderStateInService, OrderSummary, Step,
    };
    use crate::storage::MemoryStore;
    use crate::transfer::{OrderDispatcher, OrderTransfer, TransferReport};

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    const SERVICE: &str = "svc-a";

    #[derive(Default)]
    struct RecordingDispatcher {
        dispatched: Mutex<Vec<OrderRecord>>,
    }

    #[async_trait]
    impl OrderDispatcher for RecordingDispatcher {
        async fn dispatch_order(&self, record: OrderRecord) -> Result<(), PipelineError> {
            self.dispatched.lock().push(record);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingTransfer {
        sources: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl OrderTransfer for RecordingTransfer {
        async fn transfer(&self, source: &str) -> Result<TransferReport, TransferError> {
            self.sources.lock().push(source.to_string());
            Ok(TransferReport::default())
        }
    }

    struct Harness {
        repository: OrderRepository,
        dispatcher: Arc<RecordingDispatcher>,
        transfer: Arc<RecordingTransfer>,
        app: axum::Router,
    }

    fn harness() -> Harness {
        let repository = OrderRepository::new(Arc::new(MemoryStore::new()));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let transfer = Arc::new(RecordingTransfer::default());

        let state = Arc::new(ApiState {
            service_id: SERVICE.to_string(),
            repository: repository.clone(),
            dispatcher: dispatcher.clone(),
            transfer: transfer.clone(),
            tokens: Arc::new(PassthroughResolver),
        });

        Harness {
            repository,
            dispatcher,
            transfer,
            app: router(state),
        }
    }

    fn post(uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, token);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, token);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    // ============================================================
    // AUTH TESTS
    // ============================================================

    #[tokio::test]
    async fn test_passthrough_resolver() {
        let resolver = PassthroughResolver;

        assert_eq!(resolver.resolve("u1").await.unwrap().user_id, "u1");
        assert_eq!(resolver.resolve("  ").await, Err(AuthError::MissingToken));
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let h = harness();

        let create = h
            .app
            .clone()
            .oneshot(post("/orders", None, "{}"))
            .await
            .unwrap();
        let lookup = h
            .app
            .clone()
            .oneshot(get("/orders/whatever", None))
            .await
            .unwrap();
        let transfer = h
            .app
            .clone()
            .oneshot(post("/service/transfer", Some(""), r#"{"service_id":"b"}"#))
            .await
            .unwrap();

        assert_eq!(create.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(lookup.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(transfer.status(), StatusCode::UNAUTHORIZED);
        assert!(h.dispatcher.dispatched.lock().is_empty());
        assert!(h.transfer.sources.lock().is_empty());
    }

    // ============================================================
    // ORDER TESTS
    // ============================================================

    #[tokio::test]
    async fn test_create_order_registers_and_dispatches() {
        // ARRANGE
        let h = harness();

        // ACT: user_id in the body is ignored in favour of the token
        let response = h
            .app
            .clone()
            .oneshot(post(
                "/orders",
                Some("u1"),
                r#"{"user_id":"someone-else","items":[1,2]}"#,
            ))
            .await
            .unwrap();

        // ASSERT
        assert_eq!(response.status(), StatusCode::OK);
        let created: CreateOrderResponse = body_json(response).await;

        let stored = h.repository.get(created.order_id.as_str()).await.unwrap();
        assert_eq!(stored.user_id, "u1");
        assert_eq!(stored.owning_service_id, SERVICE);
        assert_eq!(stored.current_step, Step::Scheduling);
        assert_eq!(stored.start_time, created.start_time);

        let state = h
            .repository
            .ownership_state(SERVICE, &created.order_id)
            .await
            .unwrap();
        assert_eq!(state, OrderStateInService::Active);

        let dispatched = h.dispatcher.dispatched.lock();
        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].order_id, created.order_id);
    }

    #[tokio::test]
    async fn test_malformed_body_returns_parse_error() {
        let h = harness();

        let response = h
            .app
            .clone()
            .oneshot(post("/orders", Some("u1"), "{not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let text = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(text.contains("line 1"), "unexpected body: {}", text);
        assert!(h.dispatcher.dispatched.lock().is_empty());
    }

    #[tokio::test]
    async fn test_get_order_returns_summary() {
        // ARRANGE
        let h = harness();
        let record = OrderRecord::create(NewOrder {
            user_id: Some("u1".to_string()),
            owning_service_id: SERVICE.to_string(),
        })
        .unwrap();
        h.repository.register_new(&record).await.unwrap();

        // ACT
        let response = h
            .app
            .clone()
            .oneshot(get(&format!("/orders/{}", record.order_id), Some("u1")))
            .await
            .unwrap();

        // ASSERT
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = body_json(response).await;
        assert_eq!(json["current_step"], "Scheduling");
        assert!(json.get("rollback_state").is_none());
        assert!(json.get("failure_occurred").is_none());

        let summary: OrderSummary = serde_json::from_value(json).unwrap();
        assert_eq!(summary, OrderSummary::from(&record));
    }

    #[tokio::test]
    async fn test_unknown_or_invalid_order_is_not_found() {
        let h = harness();
        let unknown = uuid::Uuid::new_v4().to_string();

        let missing = h
            .app
            .clone()
            .oneshot(get(&format!("/orders/{}", unknown), Some("u1")))
            .await
            .unwrap();
        let invalid = h
            .app
            .clone()
            .oneshot(get("/orders/not-a-uuid", Some("u1")))
            .await
            .unwrap();

        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(invalid.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_welcome_route() {
        let h = harness();

        let response = h.app.clone().oneshot(get("/", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, WELCOME_MESSAGE.as_bytes());
    }

    // ============================================================
    // TRANSFER TESTS
    // ============================================================

    #[tokio::test]
    async fn test_transfer_answers_and_runs_in_background() {
        // ARRANGE
        let h = harness();

        // ACT
        let response = h
            .app
            .clone()
            .oneshot(post("/service/transfer", Some("user"), r#"{"service_id":"svc-b"}"#))
            .await
            .unwrap();

        // ASSERT
        assert_eq!(response.status(), StatusCode::OK);
        let body: TransferResponse = body_json(response).await;
        assert_eq!(body.transferred_service_id, "svc-b");
        assert_eq!(body.current_service_id, SERVICE);

        for _ in 0..100 {
            if !h.transfer.sources.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(*h.transfer.sources.lock(), vec!["svc-b".to_string()]);
    }

    #[tokio::test]
    async fn test_transfer_with_bad_body_is_rejected() {
        let h = harness();

        let response = h
            .app
            .clone()
            .oneshot(post("/service/transfer", Some("user"), r#"{"id":"svc-b"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json: serde_json::Value = body_json(response).await;
        let error = json["error"].as_str().unwrap();
        assert!(error.contains("missing field `service_id`"), "unexpected error: {}", error);
        assert!(h.transfer.sources.lock().is_empty());
    }
}
