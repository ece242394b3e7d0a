use super::auth::{TokenInfo, TokenResolver};
use super::protocol::*;
use crate::error::{AuthError, OrderError, StoreError};
use crate::order::{NewOrder, OrderRecord, OrderRepository, OrderSummary};
use crate::transfer::{OrderDispatcher, OrderTransfer};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;

/// Everything the order API needs, shared by every handler.
#[derive(Clone)]
pub struct ApiState {
    pub service_id: String,
    pub repository: OrderRepository,
    pub dispatcher: Arc<dyn OrderDispatcher>,
    pub transfer: Arc<dyn OrderTransfer>,
    pub tokens: Arc<dyn TokenResolver>,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route(ENDPOINT_WELCOME, get(handle_welcome))
        .route(ENDPOINT_ORDERS, post(handle_create_order))
        .route(ENDPOINT_ORDER, get(handle_get_order))
        .route(ENDPOINT_TRANSFER, post(handle_transfer))
        .layer(Extension(state))
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

async fn authenticate(state: &ApiState, headers: &HeaderMap) -> Result<TokenInfo, Response> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::MissingToken)
        .map_err(|e| error_response(StatusCode::UNAUTHORIZED, e))?;

    state
        .tokens
        .resolve(token)
        .await
        .map_err(|e| error_response(StatusCode::UNAUTHORIZED, e))
}

pub async fn handle_welcome() -> &'static str {
    WELCOME_MESSAGE
}

/// Registers a new order owned by this service and hands it to the pipelines.
///
/// The body may carry any JSON object; `user_id` always comes from the token.
pub async fn handle_create_order(
    Extension(state): Extension<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let caller = match authenticate(&state, &headers).await {
        Ok(caller) => caller,
        Err(response) => return response,
    };

    let parsed: Result<serde_json::Map<String, serde_json::Value>, _> =
        serde_json::from_slice(&body);
    let payload = match parsed {
        Ok(payload) => payload,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    tracing::debug!(
        "Order request from {} with {} field(s)",
        caller.user_id,
        payload.len()
    );

    let record = match OrderRecord::create(NewOrder {
        user_id: Some(caller.user_id),
        owning_service_id: state.service_id.clone(),
    }) {
        Ok(record) => record,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    if let Err(e) = state.repository.register_new(&record).await {
        tracing::error!("Failed to register order {}: {}", record.order_id, e);
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e);
    }

    let response = CreateOrderResponse {
        order_id: record.order_id.clone(),
        start_time: record.start_time,
    };

    // The order is stored and Active; a failed dispatch is picked up by the next reload.
    if let Err(e) = state.dispatcher.dispatch_order(record).await {
        tracing::error!("Failed to dispatch order {}: {}", response.order_id, e);
    } else {
        tracing::info!("Order {} accepted", response.order_id);
    }

    (StatusCode::OK, Json(response)).into_response()
}

pub async fn handle_get_order(
    Extension(state): Extension<Arc<ApiState>>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Response {
    if let Err(response) = authenticate(&state, &headers).await {
        return response;
    }

    match state.repository.get(&order_id).await {
        Ok(record) => (StatusCode::OK, Json(OrderSummary::from(&record))).into_response(),
        Err(e @ StoreError::NotFound { .. })
        | Err(e @ StoreError::Order(OrderError::InvalidOrderId(_))) => {
            error_response(StatusCode::NOT_FOUND, e)
        }
        Err(e) => {
            tracing::error!("Failed to load order {}: {}", order_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

/// Starts taking over the orders of another service and answers right away.
pub async fn handle_transfer(
    Extension(state): Extension<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(response) = authenticate(&state, &headers).await {
        return response;
    }

    let req = match serde_json::from_slice::<TransferRequest>(&body) {
        Ok(req) => req,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    tracing::info!(
        "Service {} taking over orders of {}",
        state.service_id,
        req.service_id
    );

    let transfer = state.transfer.clone();
    let source = req.service_id.clone();
    tokio::spawn(async move {
        match transfer.transfer(&source).await {
            Ok(report) => tracing::info!(
                "Transfer from {} done: {} scanned, {} dispatched, {} skipped",
                source,
                report.scanned,
                report.dispatched,
                report.skipped
            ),
            Err(e) => tracing::error!("Transfer from {} failed: {}", source, e),
        }
    });

    (
        StatusCode::OK,
        Json(TransferResponse {
            transferred_service_id: req.service_id,
            current_service_id: state.service_id.clone(),
        }),
    )
        .into_response()
}
