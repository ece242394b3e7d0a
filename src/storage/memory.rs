use super::store::{Blob, Store};
use crate::error::StoreError;

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// In-process key-hash store.
///
/// Structure: `table -> key -> blob`. Cloning shares the underlying tables, so
/// several services in one process (tests, the store server) can see the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<DashMap<String, DashMap<String, Blob>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_local(&self, table: &str, key: &str, blob: Blob) {
        let table_map = self
            .tables
            .entry(table.to_string())
            .or_insert_with(DashMap::new);
        table_map.insert(key.to_string(), blob);
    }

    pub fn read_local(&self, table: &str, key: &str) -> Option<Blob> {
        self.tables
            .get(table)
            .and_then(|table_map| table_map.get(key).map(|blob| blob.clone()))
    }

    pub fn scan_local(&self, table: &str) -> Vec<(String, Blob)> {
        let mut entries = Vec::new();
        if let Some(table_map) = self.tables.get(table) {
            for entry in table_map.iter() {
                entries.push((entry.key().clone(), entry.value().clone()));
            }
        }
        entries
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn entry_count(&self) -> usize {
        self.tables.iter().map(|entry| entry.value().len()).sum()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn write(&self, table: &str, key: &str, blob: Blob) -> Result<(), StoreError> {
        self.write_local(table, key, blob);
        tracing::trace!("Stored {}/{}", table, key);
        Ok(())
    }

    async fn read(&self, table: &str, key: &str) -> Result<Blob, StoreError> {
        self.read_local(table, key).ok_or_else(|| StoreError::NotFound {
            table: table.to_string(),
            key: key.to_string(),
        })
    }

    async fn scan(&self, table: &str) -> Result<Vec<(String, Blob)>, StoreError> {
        Ok(self.scan_local(table))
    }
}
