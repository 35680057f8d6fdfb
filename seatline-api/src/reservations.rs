use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use seatline_shared::Reservation;

use crate::error::{ApiResult, AppError};
use crate::state::AppState;
use crate::PageQuery;

#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    pub flight_id: Uuid,
    pub user_id: Uuid,
    /// A random available seat is picked when absent.
    pub seat_number: Option<String>,
    /// Leave the reservation pending until it is confirmed.
    #[serde(default)]
    pub hold: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChangeSeatRequest {
    pub seat_number: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/reservations", post(create_reservation).get(list_reservations))
        .route("/v1/reservations/{id}", get(get_reservation))
        .route("/v1/reservations/{id}/confirm", post(confirm_reservation))
        .route("/v1/reservations/{id}/cancel", post(cancel_reservation))
        .route("/v1/reservations/{id}/seat", post(change_seat))
}

// ============================================================================
// Lifecycle
// ============================================================================

/// POST /v1/reservations
async fn create_reservation(
    State(state): State<AppState>,
    Json(req): Json<CreateReservationRequest>,
) -> ApiResult<(StatusCode, Json<Reservation>)> {
    state.catalog.user(req.user_id).await?;

    let (operation, result) = match (req.seat_number.as_deref(), req.hold) {
        (Some(seat), false) => ("reserve", state.reservations.reserve(req.flight_id, seat, req.user_id).await),
        (Some(seat), true) => ("hold", state.reservations.hold(req.flight_id, seat, req.user_id).await),
        (None, false) => ("reserve_any", state.reservations.reserve_any(req.flight_id, req.user_id).await),
        (None, true) => {
            return Err(AppError::Validation("a hold needs a seat_number".to_string()));
        }
    };
    state.metrics.observe(operation, &result);
    Ok((StatusCode::CREATED, Json(result?)))
}

/// POST /v1/reservations/{id}/confirm
async fn confirm_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Reservation>> {
    let result = state.reservations.confirm(id).await;
    state.metrics.observe("confirm", &result);
    Ok(Json(result?))
}

/// POST /v1/reservations/{id}/cancel
async fn cancel_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Reservation>> {
    let result = state.reservations.cancel(id).await;
    state.metrics.observe("cancel", &result);
    Ok(Json(result?))
}

/// POST /v1/reservations/{id}/seat
async fn change_seat(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangeSeatRequest>,
) -> ApiResult<Json<Reservation>> {
    let result = state.reservations.change_seat(id, &req.seat_number).await;
    state.metrics.observe("change_seat", &result);
    Ok(Json(result?))
}

// ============================================================================
// Queries
// ============================================================================

/// GET /v1/reservations/{id}
/// Status as recorded, checked against the seat map.
async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Reservation>> {
    let result = state.reservations.status(id).await;
    state.metrics.observe("status", &result);
    Ok(Json(result?))
}

/// GET /v1/reservations?page=&page_size=
async fn list_reservations(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<Reservation>>> {
    let (page, page_size) = query.resolve(&state.business_rules);
    Ok(Json(state.reservations.list(page, page_size).await?))
}
