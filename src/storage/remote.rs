use super::protocol::*;
use super::store::{Blob, Store};
use crate::error::StoreError;

use async_trait::async_trait;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_millis(2000);
const ATTEMPTS: usize = 3;

/// Client for a store server shared by the whole cluster.
///
/// Every call is retried with exponential backoff and jitter; the final
/// transport error surfaces as `StoreError::Backend`.
pub struct HttpStore {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}{}/{}", self.base_url, ENDPOINT_STORE, table)
    }

    fn key_url(&self, table: &str, key: &str) -> String {
        format!("{}{}/{}/{}", self.base_url, ENDPOINT_STORE, table, key)
    }

    async fn post_with_retry<T: serde::Serialize>(
        &self,
        url: String,
        payload: &T,
    ) -> Result<reqwest::Response, StoreError> {
        let mut delay_ms = 150u64;

        for attempt in 0..ATTEMPTS {
            let response = self
                .http_client
                .post(url.clone())
                .json(payload)
                .timeout(REQUEST_TIMEOUT)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == ATTEMPTS {
                        return Err(StoreError::Backend(e.to_string()));
                    }
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(StoreError::Backend("retry attempts exhausted".to_string()))
    }

    async fn get_with_retry(&self, url: String) -> Result<reqwest::Response, StoreError> {
        let mut delay_ms = 150u64;

        for attempt in 0..ATTEMPTS {
            let response = self
                .http_client
                .get(url.clone())
                .timeout(REQUEST_TIMEOUT)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == ATTEMPTS {
                        return Err(StoreError::Backend(e.to_string()));
                    }
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(StoreError::Backend("retry attempts exhausted".to_string()))
    }
}

#[async_trait]
impl Store for HttpStore {
    async fn write(&self, table: &str, key: &str, blob: Blob) -> Result<(), StoreError> {
        let response = self
            .post_with_retry(self.key_url(table, key), &WriteRequest { blob })
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::Backend(format!(
                "write {}/{} failed: {}",
                table,
                key,
                response.status()
            )));
        }

        Ok(())
    }

    async fn read(&self, table: &str, key: &str) -> Result<Blob, StoreError> {
        let response = self.get_with_retry(self.key_url(table, key)).await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                table: table.to_string(),
                key: key.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(StoreError::Backend(format!(
                "read {}/{} failed: {}",
                table,
                key,
                response.status()
            )));
        }

        let read: ReadResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        read.blob.ok_or_else(|| StoreError::NotFound {
            table: table.to_string(),
            key: key.to_string(),
        })
    }

    async fn scan(&self, table: &str) -> Result<Vec<(String, Blob)>, StoreError> {
        let response = self.get_with_retry(self.table_url(table)).await?;

        if !response.status().is_success() {
            return Err(StoreError::Backend(format!(
                "scan {} failed: {}",
                table,
                response.status()
            )));
        }

        let scan: ScanResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(scan
            .entries
            .into_iter()
            .map(|entry| (entry.key, entry.blob))
            .collect())
    }
}
