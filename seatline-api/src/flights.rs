use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use seatline_catalog::FlightStatus;
use seatline_core::CoreError;
use seatline_shared::{Flight, Seat};

use crate::error::ApiResult;
use crate::state::AppState;
use crate::PageQuery;

#[derive(Debug, Deserialize)]
pub struct CreateFlightRequest {
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    /// Falls back to the configured default capacity.
    pub capacity: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SeatQuery {
    #[serde(default)]
    pub available_only: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/flights", post(create_flight).get(list_flights))
        .route("/v1/flights/{id}", get(get_flight))
        .route("/v1/flights/{id}/seats", get(list_seats))
}

/// POST /v1/flights
/// Creates the flight and initializes its seat map.
async fn create_flight(
    State(state): State<AppState>,
    Json(req): Json<CreateFlightRequest>,
) -> ApiResult<(StatusCode, Json<Flight>)> {
    let capacity = req.capacity.unwrap_or(state.business_rules.default_capacity);
    let flight = state
        .catalog
        .create_flight(&req.origin, &req.destination, req.departure_time, req.arrival_time, capacity)
        .await?;
    Ok((StatusCode::CREATED, Json(flight)))
}

/// GET /v1/flights?page=&page_size=
async fn list_flights(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<Flight>>> {
    let (page, page_size) = query.resolve(&state.business_rules);
    Ok(Json(state.catalog.list_flights(page, page_size).await?))
}

/// GET /v1/flights/{id}
/// Flight with seat availability counted from its seat map.
async fn get_flight(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<FlightStatus>> {
    Ok(Json(state.catalog.flight_status(id).await?))
}

/// GET /v1/flights/{id}/seats?available_only=
async fn list_seats(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<SeatQuery>,
) -> ApiResult<Json<Vec<Seat>>> {
    let mut seats = state.allocator.seat_map(id).await.map_err(CoreError::from)?;
    if query.available_only {
        seats.retain(|s| s.is_available);
    }
    Ok(Json(seats))
}
