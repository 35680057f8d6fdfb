use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use seatline_store::app_config::BusinessRules;

pub mod admin;
pub mod error;
pub mod flights;
pub mod metrics;
pub mod reservations;
pub mod state;
pub mod users;

pub use state::AppState;

/// `?page=&page_size=` of the listing endpoints. Bounds are checked by the
/// services.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

impl PageQuery {
    pub fn resolve(&self, rules: &BusinessRules) -> (usize, usize) {
        (
            self.page.unwrap_or(1),
            self.page_size.unwrap_or(rules.default_page_size),
        )
    }
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::USER_AGENT]);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .merge(users::routes())
        .merge(flights::routes())
        .merge(reservations::routes())
        .merge(admin::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.repos.health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "error": e.to_string() })),
            )
        }
    }
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> error::ApiResult<impl IntoResponse> {
    let body = state.metrics.render()?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body))
}
