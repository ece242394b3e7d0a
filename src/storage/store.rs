use crate::error::StoreError;
use async_trait::async_trait;

/// A stored value. Always the serialized text of a record.
pub type Blob = String;

/// The persistence interface consumed by the order repository.
///
/// Implementations must be `Send + Sync + 'static` so one handle can be shared by
/// every pipeline shard, the transfer service and the HTTP layer.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Writes `blob` under `table`/`key`, replacing any previous value.
    async fn write(&self, table: &str, key: &str, blob: Blob) -> Result<(), StoreError>;

    /// Reads one value. Missing keys yield `StoreError::NotFound`.
    async fn read(&self, table: &str, key: &str) -> Result<Blob, StoreError>;

    /// Returns every `(key, blob)` of a table. A missing table is empty.
    async fn scan(&self, table: &str) -> Result<Vec<(String, Blob)>, StoreError>;
}
