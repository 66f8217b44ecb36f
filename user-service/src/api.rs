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
use shared::models::{NewUser, User};
use shared::schema::users;
use uuid::Uuid;

type DbPool = Pool<AsyncPgConnection>;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/users", post(create_user).get(list_users))
        .route("/users/:user_id", get(get_user))
        .route("/health", get(health_check))
        .with_state(state)
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<Json<User>, (StatusCode, Json<ErrorResponse>)> {
    if !request.email.contains('@') {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: "Invalid email address".to_string() }),
        ));
    }

    let mut conn = state.pool.get().await.map_err(internal_error)?;

    let new_user = NewUser {
        id: Uuid::new_v4(),
        name: request.name,
        email: request.email,
    };

    match diesel::insert_into(users::table).values(&new_user).execute(&mut conn).await {
        Ok(_) => {
            let user = users::table
                .filter(users::id.eq(new_user.id))
                .first::<User>(&mut conn)
                .await
                .map_err(internal_error)?;
            tracing::info!("Registered user {}", user.id);
            Ok(Json(user))
        }
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: "Email already in use".to_string() }),
        )),
        Err(e) => Err(internal_error(e)),
    }
}

pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<User>>, (StatusCode, Json<ErrorResponse>)> {
    let mut conn = state.pool.get().await.map_err(internal_error)?;

    let all = users::table
        .order(users::created_at.asc())
        .load::<User>(&mut conn)
        .await
        .map_err(internal_error)?;

    Ok(Json(all))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<User>, (StatusCode, Json<ErrorResponse>)> {
    let mut conn = state.pool.get().await.map_err(internal_error)?;

    let user = users::table
        .filter(users::id.eq(user_id))
        .first::<User>(&mut conn)
        .await
        .optional()
        .map_err(internal_error)?;

    match user {
        Some(user) => Ok(Json(user)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse { error: "User not found".to_string() }),
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
