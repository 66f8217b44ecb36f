use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use shared::models::{NewProduct, Product};
use shared::schema::products;
use uuid::Uuid;

type DbPool = Pool<AsyncPgConnection>;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub quantity_on_hand: i32,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/products", post(create_product).get(list_products))
        .route("/products/:product_id", get(get_product))
        .route("/health", get(health_check))
        .with_state(state)
}

pub async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<CreateProductRequest>,
) -> Result<Json<Product>, (StatusCode, Json<ErrorResponse>)> {
    if request.quantity_on_hand < 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: "Initial quantity cannot be negative".to_string() }),
        ));
    }

    let mut conn = state.pool.get().await.map_err(internal_error)?;

    let new_product = NewProduct {
        id: Uuid::new_v4(),
        name: request.name,
        quantity_on_hand: request.quantity_on_hand,
    };

    match diesel::insert_into(products::table).values(&new_product).execute(&mut conn).await {
        Ok(_) => {
            let product = products::table
                .filter(products::id.eq(new_product.id))
                .first::<Product>(&mut conn)
                .await
                .map_err(internal_error)?;
            tracing::info!(
                "Registered product {} with {} on hand",
                product.id,
                product.quantity_on_hand
            );
            Ok(Json(product))
        }
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: "Product with this name already exists".to_string() }),
        )),
        Err(e) => Err(internal_error(e)),
    }
}

pub async fn list_products(
    State(state): State<AppState>,
) -> Result<Json<Vec<Product>>, (StatusCode, Json<ErrorResponse>)> {
    let mut conn = state.pool.get().await.map_err(internal_error)?;

    let all = products::table
        .order(products::created_at.asc())
        .load::<Product>(&mut conn)
        .await
        .map_err(internal_error)?;

    Ok(Json(all))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<Product>, (StatusCode, Json<ErrorResponse>)> {
    let mut conn = state.pool.get().await.map_err(internal_error)?;

    let product = products::table
        .filter(products::id.eq(product_id))
        .first::<Product>(&mut conn)
        .await
        .optional()
        .map_err(internal_error)?;

    match product {
        Some(product) => Ok(Json(product)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse { error: "Product not found".to_string() }),
        )),
    }
}

pub async fn health_check() -> &'static str {
    "OK"
}

fn internal_error<E: std::fmt::Display>(e: E) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: e.to_string() }),
    )
}
