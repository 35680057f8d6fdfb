use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

use seatline_order::{analyze_fairness, AuditReport, FairnessReport, LoadReport, LoadTester};

use crate::error::{ApiResult, AppError};
use crate::state::AppState;

/// Upper bound on requests a single load-test run may issue.
const MAX_LOAD_REQUESTS: usize = 10_000;
const MAX_LOAD_USERS: usize = 1_000;
const MAX_LOAD_CLIENTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadScenario {
    RapidRequests,
    MultipleClients,
    SeatCompetition,
}

#[derive(Debug, Deserialize)]
pub struct LoadTestRequest {
    pub scenario: LoadScenario,
    #[serde(default = "default_users")]
    pub users: usize,
    #[serde(default = "default_flights")]
    pub flights: usize,
    #[serde(default = "default_requests")]
    pub requests: usize,
    #[serde(default = "default_clients")]
    pub clients: usize,
    #[serde(default = "default_requests")]
    pub per_client: usize,
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
}

fn default_users() -> usize {
    15
}

fn default_flights() -> usize {
    4
}

fn default_requests() -> usize {
    10
}

fn default_clients() -> usize {
    5
}

fn default_pause_ms() -> u64 {
    10
}

#[derive(Debug, Serialize)]
pub struct LoadTestResponse {
    pub scenario: LoadScenario,
    pub report: LoadReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fairness: Option<FairnessReport>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/flights/{id}/audit", get(audit_flight))
        .route("/v1/admin/flights/{id}/seats", post(restore_seats))
        .route("/v1/admin/reservations/{id}/release", post(retry_release))
        .route("/v1/admin/load-test", post(run_load_test))
}

/// GET /v1/admin/flights/{id}/audit
async fn audit_flight(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<AuditReport>> {
    Ok(Json(state.reservations.audit(id).await?))
}

/// POST /v1/admin/flights/{id}/seats
/// Fill in seats missing after an interrupted flight creation.
async fn restore_seats(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    let inserted = state.catalog.ensure_seats(id).await?;
    Ok(Json(json!({ "inserted": inserted })))
}

/// POST /v1/admin/reservations/{id}/release
/// Retry the seat release of a canceled reservation.
async fn retry_release(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    let result = state.reservations.retry_release(id).await;
    state.metrics.observe("retry_release", &result);
    Ok(Json(json!({ "released": result? })))
}

/// POST /v1/admin/load-test
/// Seeds fresh users and flights, then runs one stress scenario against them.
async fn run_load_test(
    State(state): State<AppState>,
    Json(req): Json<LoadTestRequest>,
) -> ApiResult<Json<LoadTestResponse>> {
    if req.flights == 0 || req.users == 0 {
        return Err(AppError::Validation("need at least one user and one flight".to_string()));
    }
    if req.users > MAX_LOAD_USERS {
        return Err(AppError::Validation(format!("at most {} users per run", MAX_LOAD_USERS)));
    }
    if req.clients > MAX_LOAD_CLIENTS {
        return Err(AppError::Validation(format!("at most {} clients per run", MAX_LOAD_CLIENTS)));
    }
    if req.scenario == LoadScenario::SeatCompetition && req.users < 2 {
        return Err(AppError::Validation("seat competition needs two users".to_string()));
    }
    let planned = match req.scenario {
        LoadScenario::RapidRequests => req.requests,
        LoadScenario::MultipleClients => req.clients.saturating_mul(req.per_client),
        LoadScenario::SeatCompetition => 0,
    };
    if planned > MAX_LOAD_REQUESTS {
        return Err(AppError::Validation(format!(
            "at most {} requests per run",
            MAX_LOAD_REQUESTS
        )));
    }

    let fixtures = state.catalog.generate_test_data(req.users, req.flights).await?;
    let (Some(&user_id), Some(&flight_id)) = (fixtures.user_ids.first(), fixtures.flight_ids.first()) else {
        return Err(AppError::Validation("no fixture flights were generated".to_string()));
    };
    let tester = LoadTester::new(state.reservations.clone()).with_pause(Duration::from_millis(req.pause_ms));
    tracing::info!("Running {:?} load test", req.scenario);

    let (report, fairness) = match req.scenario {
        LoadScenario::RapidRequests => (tester.rapid_requests(user_id, flight_id, req.requests).await, None),
        LoadScenario::MultipleClients => {
            let report = tester
                .multiple_clients(&fixtures.user_ids, &fixtures.flight_ids, req.clients, req.per_client)
                .await?;
            (report, None)
        }
        LoadScenario::SeatCompetition => {
            let users = [fixtures.user_ids[0], fixtures.user_ids[1]];
            let report = tester.seat_competition(users, flight_id).await?;
            let status = state.catalog.flight_status(flight_id).await?;
            let fairness = analyze_fairness(&report, status.seats_reserved(), status.total_seats);
            (report, Some(fairness))
        }
    };

    Ok(Json(LoadTestResponse {
        scenario: req.scenario,
        report,
        fairness,
    }))
}
