//! Storage Module Tests
//!
//! Validates the key-hash store backends.
//!
//! ## Test Scopes
//! - **MemoryStore**: table isolation, overwrite and scan semantics.
//! - **Store server**: routes and status codes of the HTTP front.
//! - **HttpStore**: the client talking to a live store server on a local port.

#[cfg(test)]
mod tests {
    use crate::error::StoreError;
    use crate::storage::handlers::router;
    use crate::storage::protocol::{ReadResponse, ScanResponse, WriteRequest};
    use crate::storage::{HttpStore, MemoryStore, Store};

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    // ============================================================
    // MEMORY STORE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_memory_store_write_and_read() {
        // ARRANGE
        let store = MemoryStore::new();

        // ACT
        store.write("Orders", "k1", "v1".to_string()).await.unwrap();
        store.write("Orders", "k1", "v2".to_string()).await.unwrap();

        // ASSERT: last write wins
        assert_eq!(store.read("Orders", "k1").await.unwrap(), "v2");
        assert_eq!(store.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_missing_key_is_not_found() {
        let store = MemoryStore::new();
        store.write("Orders", "k1", "v1".to_string()).await.unwrap();

        let missing_key = store.read("Orders", "k2").await;
        let missing_table = store.read("Nope", "k1").await;

        assert!(matches!(missing_key, Err(StoreError::NotFound { .. })));
        assert!(matches!(missing_table, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_memory_store_tables_are_isolated() {
        // ARRANGE
        let store = MemoryStore::new();
        store.write("A", "k", "a".to_string()).await.unwrap();
        store.write("B", "k", "b".to_string()).await.unwrap();
        store.write("B", "k2", "b2".to_string()).await.unwrap();

        // ACT
        let mut scanned = store.scan("B").await.unwrap();
        scanned.sort();

        // ASSERT
        assert_eq!(store.table_count(), 2);
        assert_eq!(
            scanned,
            vec![
                ("k".to_string(), "b".to_string()),
                ("k2".to_string(), "b2".to_string())
            ]
        );
        assert!(store.scan("C").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_clones_share_data() {
        let store = MemoryStore::new();
        let other = store.clone();

        other.write_local("Orders", "k", "v".to_string());

        assert_eq!(store.read_local("Orders", "k").as_deref(), Some("v"));
    }

    // ============================================================
    // STORE SERVER TESTS
    // ============================================================

    #[tokio::test]
    async fn test_server_write_then_read() {
        // ARRANGE
        let store = MemoryStore::new();
        let app = router(store.clone());

        let body = serde_json::to_vec(&WriteRequest {
            blob: "{\"x\":1}".to_string(),
        })
        .unwrap();

        // ACT: write
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/store/Orders/k1")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        // ASSERT
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(store.read_local("Orders", "k1").as_deref(), Some("{\"x\":1}"));

        // ACT: read back
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/store/Orders/k1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        // ASSERT
        assert_eq!(response.status(), StatusCode::OK);
        let read: ReadResponse = body_json(response).await;
        assert_eq!(read.blob.as_deref(), Some("{\"x\":1}"));
    }

    #[tokio::test]
    async fn test_server_missing_key_is_404() {
        let app = router(MemoryStore::new());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/store/Orders/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_server_scan_lists_table() {
        // ARRANGE
        let store = MemoryStore::new();
        store.write_local("OrderStateInService:svc", "k1", "a".to_string());
        store.write_local("OrderStateInService:svc", "k2", "b".to_string());
        store.write_local("Orders", "k3", "c".to_string());
        let app = router(store);

        // ACT
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/store/OrderStateInService:svc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        // ASSERT
        assert_eq!(response.status(), StatusCode::OK);
        let scan: ScanResponse = body_json(response).await;
        assert_eq!(scan.table, "OrderStateInService:svc");
        assert_eq!(scan.entries.len(), 2);
    }

    // ============================================================
    // HTTP STORE CLIENT TESTS
    // ============================================================

    #[tokio::test]
    async fn test_http_store_against_live_server() {
        // ARRANGE: serve a MemoryStore on an ephemeral port
        let backing = MemoryStore::new();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(backing.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = HttpStore::new(&format!("http://{}/", addr));

        // ACT
        client
            .write("Orders", "k1", "v1".to_string())
            .await
            .unwrap();
        let read = client.read("Orders", "k1").await.unwrap();
        let missing = client.read("Orders", "k2").await;
        let scanned = client.scan("Orders").await.unwrap();

        // ASSERT
        assert_eq!(read, "v1");
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
        assert_eq!(scanned, vec![("k1".to_string(), "v1".to_string())]);
        assert_eq!(backing.read_local("Orders", "k1").as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_http_store_unreachable_is_backend_error() {
        // ARRANGE: grab a free port, then close it
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpStore::new(&format!("http://{}", addr));

        // ACT
        let result = client.read("Orders", "k1").await;

        // ASSERT
        assert!(matches!(result, Err(StoreError::Backend(_))));
    }
}
