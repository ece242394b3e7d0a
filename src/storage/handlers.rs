use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::get,
};

use super::memory::MemoryStore;
use super::protocol::{ReadResponse, ScanEntry, ScanResponse, WriteRequest, WriteResponse};

/// Routes of the standalone store server.
pub fn router(store: MemoryStore) -> Router {
    Router::new()
        .route("/store/:table", get(handle_scan))
        .route("/store/:table/:key", get(handle_read).post(handle_write))
        .layer(Extension(store))
}

pub async fn handle_write(
    Extension(store): Extension<MemoryStore>,
    Path((table, key)): Path<(String, String)>,
    Json(req): Json<WriteRequest>,
) -> (StatusCode, Json<WriteResponse>) {
    store.write_local(&table, &key, req.blob);
    tracing::debug!("Stored {}/{}", table, key);

    (StatusCode::OK, Json(WriteResponse { success: true }))
}

pub async fn handle_read(
    Extension(store): Extension<MemoryStore>,
    Path((table, key)): Path<(String, String)>,
) -> (StatusCode, Json<ReadResponse>) {
    match store.read_local(&table, &key) {
        Some(blob) => (StatusCode::OK, Json(ReadResponse { blob: Some(blob) })),
        None => {
            tracing::debug!("Key {}/{} not found", table, key);
            (StatusCode::NOT_FOUND, Json(ReadResponse { blob: None }))
        }
    }
}

pub async fn handle_scan(
    Extension(store): Extension<MemoryStore>,
    Path(table): Path<String>,
) -> (StatusCode, Json<ScanResponse>) {
    let entries = store
        .scan_local(&table)
        .into_iter()
        .map(|(key, blob)| ScanEntry { key, blob })
        .collect();

    (StatusCode::OK, Json(ScanResponse { table, entries }))
}
