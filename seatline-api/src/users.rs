use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use seatline_shared::{Reservation, User};

use crate::error::ApiResult;
use crate::state::AppState;
use crate::PageQuery;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/users", post(create_user).get(list_users))
        .route("/v1/users/{id}", get(get_user))
        .route("/v1/users/{id}/reservations", get(list_user_reservations))
}

/// POST /v1/users
async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user = state.catalog.create_user(&req.name, &req.email).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /v1/users?page=&page_size=
async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<User>>> {
    let (page, page_size) = query.resolve(&state.business_rules);
    Ok(Json(state.catalog.list_users(page, page_size).await?))
}

/// GET /v1/users/{id}
async fn get_user(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<User>> {
    Ok(Json(state.catalog.user(id).await?))
}

/// GET /v1/users/{id}/reservations
async fn list_user_reservations(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Reservation>>> {
    state.catalog.user(id).await?;
    Ok(Json(state.reservations.list_for_user(id).await?))
}
