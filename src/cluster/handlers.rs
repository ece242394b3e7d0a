use super::protocol::*;
use super::service::ClusterService;
use crate::error::ClusterError;

use axum::{
    Json, Router,
    extract::Extension,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;

/// Routes every cluster member serves: consensus RPCs, join and diagnostics.
pub fn router(cluster: Arc<ClusterService>) -> Router {
    Router::new()
        .route(ENDPOINT_JOIN, post(handle_join))
        .route(ENDPOINT_VOTE, post(handle_vote))
        .route(ENDPOINT_APPEND, post(handle_append))
        .route(ENDPOINT_HEARTBEAT, get(handle_heartbeat))
        .route(ENDPOINT_DESCRIBE, get(handle_describe))
        .layer(Extension(cluster))
}

fn redirect(status: StatusCode, leader_addr: &str, path: &str) -> Response {
    let location = format!("{}{}", leader_addr.trim_end_matches('/'), path);
    (status, [(header::LOCATION, location)]).into_response()
}

fn error_response(status: StatusCode, e: ClusterError) -> Response {
    (status, Json(ErrorResponse { error: e.to_string() })).into_response()
}

pub async fn handle_join(
    Extension(cluster): Extension<Arc<ClusterService>>,
    Json(req): Json<JoinRequest>,
) -> Response {
    let service_id = req.service_id.clone();

    match cluster.register_peer(req).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(ClusterError::RedirectRequired { leader_addr }) => {
            tracing::debug!("Redirecting join of {} to {}", service_id, leader_addr);
            redirect(StatusCode::TEMPORARY_REDIRECT, &leader_addr, ENDPOINT_JOIN)
        }
        Err(e) => {
            tracing::warn!("Join of {} failed: {}", service_id, e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, e)
        }
    }
}

pub async fn handle_vote(
    Extension(cluster): Extension<Arc<ClusterService>>,
    Json(req): Json<VoteRequest>,
) -> Response {
    match cluster.handle_vote(req).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(e) => {
            tracing::error!("Vote handling failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

pub async fn handle_append(
    Extension(cluster): Extension<Arc<ClusterService>>,
    Json(req): Json<AppendRequest>,
) -> Response {
    match cluster.handle_append(req).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(e) => {
            tracing::error!("Append handling failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

pub async fn handle_heartbeat(
    Extension(cluster): Extension<Arc<ClusterService>>,
) -> (StatusCode, Json<HeartbeatResponse>) {
    (StatusCode::OK, Json(cluster.heartbeat()))
}

pub async fn handle_describe(Extension(cluster): Extension<Arc<ClusterService>>) -> Response {
    match cluster.describe() {
        Ok(description) => (StatusCode::OK, Json(description)).into_response(),
        Err(ClusterError::RedirectRequired { leader_addr }) => {
            redirect(StatusCode::SEE_OTHER, &leader_addr, ENDPOINT_DESCRIBE)
        }
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, e),
    }
}
