use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coordinator::{OrderCoordinator, PlaceOrder};
use crate::error::OrderError;
use crate::models::Order;
use crate::pg::PgStore;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<OrderCoordinator<PgStore>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:order_id", get(get_order))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Json<Order>, (StatusCode, Json<ErrorResponse>)> {
    let idempotency_key = request
        .idempotency_key
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let placed = state
        .coordinator
        .place_order(PlaceOrder {
            user_id: request.user_id,
            product_id: request.product_id,
            quantity: request.quantity,
            idempotency_key,
        })
        .await;

    match placed {
        Ok(order) if order.is_rejected() => Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: format!("insufficient stock for product {}", order.product_id),
            }),
        )),
        Ok(order) => Ok(Json(order)),
        Err(e) => Err(error_response(e)),
    }
}

pub async fn list_orders(
    State(state): State<AppState>,
) -> Result<Json<Vec<Order>>, (StatusCode, Json<ErrorResponse>)> {
    let all = state
        .coordinator
        .list_orders()
        .await
        .map_err(error_response)?;

    Ok(Json(all))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, (StatusCode, Json<ErrorResponse>)> {
    let order = state
        .coordinator
        .get_order(order_id)
        .await
        .map_err(error_response)?;

    match order {
        Some(order) => Ok(Json(order)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse { error: "Order not found".to_string() }),
        )),
    }
}

pub async fn health_check() -> &'static str {
    "OK"
}

fn error_response(err: OrderError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        OrderError::ProductNotFound(_) | OrderError::UserNotFound(_) => StatusCode::NOT_FOUND,
        OrderError::InvalidQuantity(_) => StatusCode::BAD_REQUEST,
        OrderError::InsufficientStock { .. } => StatusCode::CONFLICT,
        OrderError::Contention { .. } | OrderError::InFlight(_) => StatusCode::SERVICE_UNAVAILABLE,
        OrderError::Durability(_) | OrderError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, Json(ErrorResponse { error: err.to_string() }))
}
