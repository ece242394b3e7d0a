use super::protocol::*;
use super::types::base_url;
use crate::error::ClusterError;

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

const RPC_TIMEOUT: Duration = Duration::from_millis(400);
const REQUEST_TIMEOUT: Duration = Duration::from_millis(2000);
const JOIN_TIMEOUT: Duration = Duration::from_secs(15);
const ATTEMPTS: usize = 3;
const MAX_REDIRECTS: usize = 3;

/// How cluster members reach each other. Addresses are `host:port` or base URLs.
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    async fn request_vote(&self, addr: &str, req: VoteRequest)
    -> Result<VoteResponse, ClusterError>;

    async fn append_entries(
        &self,
        addr: &str,
        req: AppendRequest,
    ) -> Result<AppendResponse, ClusterError>;

    /// Lightweight liveness probe.
    async fn probe(&self, addr: &str) -> Result<HeartbeatResponse, ClusterError>;

    /// Asks the service at `addr` to take over the orders of `req.service_id`.
    async fn request_transfer(
        &self,
        addr: &str,
        req: TransferRequest,
    ) -> Result<TransferResponse, ClusterError>;

    /// Submits a join through `addr`, following redirects to the leader.
    async fn join(&self, addr: &str, req: JoinRequest) -> Result<JoinResponse, ClusterError>;
}

pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, ClusterError> {
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ClusterError::Transport(e.to_string()))?;

        Ok(Self { http_client })
    }

    async fn post_rpc<Req, Resp>(&self, url: String, payload: &Req) -> Result<Resp, ClusterError>
    where
        Req: serde::Serialize + Sync,
        Resp: serde::de::DeserializeOwned,
    {
        let response = self
            .http_client
            .post(url.clone())
            .json(payload)
            .timeout(RPC_TIMEOUT)
            .send()
            .await
            .map_err(|e| ClusterError::Transport(format!("{}: {}", url, e)))?;

        decode(&url, response).await
    }

    async fn post_with_retry<T: serde::Serialize + Sync>(
        &self,
        url: String,
        payload: &T,
        timeout: Duration,
    ) -> Result<reqwest::Response, ClusterError> {
        let mut delay_ms = 150u64;

        for attempt in 0..ATTEMPTS {
            let mut request = self
                .http_client
                .post(url.clone())
                .json(payload)
                .timeout(timeout);
            if url.ends_with(ENDPOINT_TRANSFER) {
                request = request.header(reqwest::header::AUTHORIZATION, CLUSTER_TOKEN);
            }

            match request.send().await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == ATTEMPTS {
                        return Err(ClusterError::Transport(format!("{}: {}", url, e)));
                    }
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(ClusterError::Transport("retry attempts exhausted".to_string()))
    }
}

async fn decode<Resp: serde::de::DeserializeOwned>(
    url: &str,
    response: reqwest::Response,
) -> Result<Resp, ClusterError> {
    let status = response.status();
    if !status.is_success() {
        let reason = response.text().await.unwrap_or_default();
        return Err(ClusterError::Rejected {
            peer: url.to_string(),
            reason: format!("{}: {}", status, reason),
        });
    }

    response
        .json()
        .await
        .map_err(|e| ClusterError::Transport(format!("{}: {}", url, e)))
}

#[async_trait]
impl ClusterTransport for HttpTransport {
    async fn request_vote(
        &self,
        addr: &str,
        req: VoteRequest,
    ) -> Result<VoteResponse, ClusterError> {
        self.post_rpc(format!("{}{}", base_url(addr), ENDPOINT_VOTE), &req)
            .await
    }

    async fn append_entries(
        &self,
        addr: &str,
        req: AppendRequest,
    ) -> Result<AppendResponse, ClusterError> {
        self.post_rpc(format!("{}{}", base_url(addr), ENDPOINT_APPEND), &req)
            .await
    }

    async fn probe(&self, addr: &str) -> Result<HeartbeatResponse, ClusterError> {
        let url = format!("{}{}", base_url(addr), ENDPOINT_HEARTBEAT);
        let response = self
            .http_client
            .get(url.clone())
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| ClusterError::Transport(format!("{}: {}", url, e)))?;

        decode(&url, response).await
    }

    async fn request_transfer(
        &self,
        addr: &str,
        req: TransferRequest,
    ) -> Result<TransferResponse, ClusterError> {
        let url = format!("{}{}", base_url(addr), ENDPOINT_TRANSFER);
        let response = self
            .post_with_retry(url.clone(), &req, REQUEST_TIMEOUT)
            .await?;

        decode(&url, response).await
    }

    async fn join(&self, addr: &str, req: JoinRequest) -> Result<JoinResponse, ClusterError> {
        let mut url = format!("{}{}", base_url(addr), ENDPOINT_JOIN);

        for _ in 0..=MAX_REDIRECTS {
            let response = self.post_with_retry(url.clone(), &req, JOIN_TIMEOUT).await?;

            if response.status() == StatusCode::TEMPORARY_REDIRECT
                || response.status() == StatusCode::PERMANENT_REDIRECT
            {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .ok_or_else(|| ClusterError::Rejected {
                        peer: url.clone(),
                        reason: "redirect without location".to_string(),
                    })?;

                tracing::info!("Join redirected from {} to {}", url, location);
                url = location.to_string();
                continue;
            }

            return decode(&url, response).await;
        }

        Err(ClusterError::Rejected {
            peer: url,
            reason: "too many redirects".to_string(),
        })
    }
}
