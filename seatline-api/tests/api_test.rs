use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use seatline_api::{app, AppState};
use seatline_core::events::RecordingEventSink;
use seatline_core::repository::Repositories;
use seatline_store::app_config::BusinessRules;
use seatline_store::MemoryStore;

struct TestApp {
    router: Router,
    repos: Repositories,
    events: Arc<RecordingEventSink>,
}

#[derive(Debug)]
struct TestResponse {
    status: StatusCode,
    body: Value,
}

impl TestApp {
    fn new() -> Self {
        let repos = Repositories::from_store(Arc::new(MemoryStore::new()));
        let events = Arc::new(RecordingEventSink::new());
        let state = AppState::new(repos.clone(), events.clone(), BusinessRules::default()).unwrap();
        Self {
            router: app(state),
            repos,
            events,
        }
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let body = body.map(|b| b.to_string()).unwrap_or_default();
        let req = Request::builder()
            .method(method)
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body))
            .unwrap();

        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse { status, body }
    }

    async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    async fn create_user(&self, name: &str) -> String {
        let res = self
            .post("/v1/users", json!({ "name": name, "email": format!("{}@test.com", name) }))
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "{:?}", res.body);
        res.body["id"].as_str().unwrap().to_string()
    }

    async fn create_flight(&self, capacity: u32) -> String {
        let departure = Utc::now() + Duration::days(1);
        let res = self
            .post(
                "/v1/flights",
                json!({
                    "origin": "TestCity1",
                    "destination": "TestDest1",
                    "departure_time": departure,
                    "arrival_time": departure + Duration::hours(2),
                    "capacity": capacity,
                }),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "{:?}", res.body);
        res.body["id"].as_str().unwrap().to_string()
    }

    async fn reserve(&self, flight: &str, user: &str, seat: &str) -> TestResponse {
        self.post(
            "/v1/reservations",
            json!({ "flight_id": flight, "user_id": user, "seat_number": seat }),
        )
        .await
    }

    async fn seat_available(&self, flight: &str, seat: &str) -> bool {
        let res = self.get(&format!("/v1/flights/{}/seats", flight)).await;
        res.body
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["seat_number"] == seat)
            .map(|s| s["is_available"].as_bool().unwrap())
            .unwrap()
    }
}

#[tokio::test]
async fn test_two_seat_flight_scenario() {
    let app = TestApp::new();
    let flight = app.create_flight(2).await;
    let u1 = app.create_user("user1").await;
    let u2 = app.create_user("user2").await;
    let u3 = app.create_user("user3").await;

    let first = app.reserve(&flight, &u1, "A1").await;
    assert_eq!(first.status, StatusCode::CREATED);
    assert_eq!(first.body["status"], "confirmed");

    let taken = app.reserve(&flight, &u2, "A1").await;
    assert_eq!(taken.status, StatusCode::CONFLICT);
    assert!(taken.body["error"].as_str().unwrap().contains("A1"));

    let second = app.reserve(&flight, &u2, "A2").await;
    assert_eq!(second.status, StatusCode::CREATED);
    assert_eq!(second.body["status"], "confirmed");

    let id = first.body["id"].as_str().unwrap();
    let canceled = app.post(&format!("/v1/reservations/{}/cancel", id), json!({})).await;
    assert_eq!(canceled.status, StatusCode::OK);
    assert_eq!(canceled.body["status"], "canceled");
    assert!(app.seat_available(&flight, "A1").await);

    let third = app.reserve(&flight, &u3, "A1").await;
    assert_eq!(third.status, StatusCode::CREATED);
    assert_eq!(third.body["status"], "confirmed");

    let status = app.get(&format!("/v1/flights/{}", flight)).await;
    assert_eq!(status.body["total_seats"], 2);
    assert_eq!(status.body["available_seats"], 0);
    assert_eq!(status.body["confirmed_reservations"], 2);

    assert_eq!(
        app.events.topics().await,
        vec![
            "reservation.confirmed",
            "reservation.confirmed",
            "reservation.canceled",
            "reservation.confirmed",
        ]
    );
}

#[tokio::test]
async fn test_hold_then_confirm() {
    let app = TestApp::new();
    let flight = app.create_flight(4).await;
    let user = app.create_user("holder").await;

    let held = app
        .post(
            "/v1/reservations",
            json!({ "flight_id": flight, "user_id": user, "seat_number": "A3", "hold": true }),
        )
        .await;
    assert_eq!(held.status, StatusCode::CREATED);
    assert_eq!(held.body["status"], "pending");
    assert!(!app.seat_available(&flight, "A3").await);

    let id = held.body["id"].as_str().unwrap();
    let confirmed = app.post(&format!("/v1/reservations/{}/confirm", id), json!({})).await;
    assert_eq!(confirmed.body["status"], "confirmed");

    let again = app.post(&format!("/v1/reservations/{}/confirm", id), json!({})).await;
    assert_eq!(again.status, StatusCode::CONFLICT);

    let fetched = app.get(&format!("/v1/reservations/{}", id)).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body["seat_number"], "A3");
}

#[tokio::test]
async fn test_hold_requires_seat() {
    let app = TestApp::new();
    let flight = app.create_flight(2).await;
    let user = app.create_user("holder").await;

    let res = app
        .post("/v1/reservations", json!({ "flight_id": flight, "user_id": user, "hold": true }))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_random_seat_until_sold_out() {
    let app = TestApp::new();
    let flight = app.create_flight(2).await;
    let user = app.create_user("traveler").await;

    for _ in 0..2 {
        let res = app
            .post("/v1/reservations", json!({ "flight_id": flight, "user_id": user }))
            .await;
        assert_eq!(res.status, StatusCode::CREATED);
    }
    let sold_out = app
        .post("/v1/reservations", json!({ "flight_id": flight, "user_id": user }))
        .await;
    assert_eq!(sold_out.status, StatusCode::CONFLICT);
    assert_eq!(sold_out.body["error"], "no seats available");

    let mine = app.get(&format!("/v1/users/{}/reservations", user)).await;
    assert_eq!(mine.body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_change_seat() {
    let app = TestApp::new();
    let flight = app.create_flight(8).await;
    let user = app.create_user("mover").await;

    let res = app.reserve(&flight, &user, "A1").await;
    let id = res.body["id"].as_str().unwrap();

    let moved = app
        .post(&format!("/v1/reservations/{}/seat", id), json!({ "seat_number": "B2" }))
        .await;
    assert_eq!(moved.status, StatusCode::OK);
    assert_eq!(moved.body["seat_number"], "B2");
    assert!(app.seat_available(&flight, "A1").await);
    assert!(!app.seat_available(&flight, "B2").await);

    let audit = app.get(&format!("/v1/admin/flights/{}/audit", flight)).await;
    assert_eq!(audit.status, StatusCode::OK);
    assert_eq!(audit.body["divergences"], json!([]));
}

#[tokio::test]
async fn test_error_mapping() {
    let app = TestApp::new();
    let flight = app.create_flight(2).await;
    let user = app.create_user("someone").await;
    let unknown = uuid::Uuid::new_v4();

    let no_seat = app.reserve(&flight, &user, "Z9").await;
    assert_eq!(no_seat.status, StatusCode::NOT_FOUND);

    let no_user = app.reserve(&flight, &unknown.to_string(), "A1").await;
    assert_eq!(no_user.status, StatusCode::NOT_FOUND);
    assert!(app.seat_available(&flight, "A1").await);

    let no_reservation = app.get(&format!("/v1/reservations/{}", unknown)).await;
    assert_eq!(no_reservation.status, StatusCode::NOT_FOUND);

    let bad_user = app.post("/v1/users", json!({ "name": "x", "email": "not-an-email" })).await;
    assert_eq!(bad_user.status, StatusCode::BAD_REQUEST);

    let bad_page = app.get("/v1/users?page=0").await;
    assert_eq!(bad_page.status, StatusCode::BAD_REQUEST);

    let release_active = app
        .post(
            &format!(
                "/v1/admin/reservations/{}/release",
                app.reserve(&flight, &user, "A2").await.body["id"].as_str().unwrap()
            ),
            json!({}),
        )
        .await;
    assert_eq!(release_active.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_listing_pages() {
    let app = TestApp::new();
    for i in 0..3 {
        app.create_user(&format!("user{}", i)).await;
    }

    let page = app.get("/v1/users?page=1&page_size=2").await;
    assert_eq!(page.body.as_array().unwrap().len(), 2);
    let rest = app.get("/v1/users?page=2&page_size=2").await;
    assert_eq!(rest.body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = TestApp::new();
    let flight = app.create_flight(1).await;
    let user = app.create_user("counter").await;
    app.reserve(&flight, &user, "A1").await;
    app.reserve(&flight, &user, "A1").await;

    let health = app.get("/health").await;
    assert_eq!(health.status, StatusCode::OK);
    assert_eq!(health.body["status"], "ok");

    let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains(r#"seatline_reservation_outcomes_total{operation="reserve",outcome="ok"} 1"#));
    assert!(text.contains(r#"seatline_reservation_outcomes_total{operation="reserve",outcome="conflict"} 1"#));

    app.repos.close().await;
    let down = app.get("/health").await;
    assert_eq!(down.status, StatusCode::SERVICE_UNAVAILABLE);
    let reserve = app.reserve(&flight, &user, "A1").await;
    assert_eq!(reserve.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_seat_competition_load_test() {
    let app = TestApp::new();
    let res = app
        .post(
            "/v1/admin/load-test",
            json!({ "scenario": "seat_competition", "users": 2, "flights": 1, "pause_ms": 0 }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK, "{:?}", res.body);
    assert_eq!(res.body["scenario"], "seat_competition");
    assert_eq!(res.body["report"]["successful"], 25);
    assert_eq!(res.body["fairness"]["seats_reserved"], 25);
    assert_eq!(res.body["fairness"]["no_overselling"], true);
}

#[tokio::test]
async fn test_load_test_rejects_bad_input() {
    let app = TestApp::new();
    let res = app
        .post("/v1/admin/load-test", json!({ "scenario": "seat_competition", "users": 1 }))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app
        .post(
            "/v1/admin/load-test",
            json!({ "scenario": "multiple_clients", "clients": 100, "per_client": 1000 }),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app
        .post(
            "/v1/admin/load-test",
            json!({ "scenario": "multiple_clients", "clients": 1_000_000, "per_client": 0 }),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app
        .post(
            "/v1/admin/load-test",
            json!({ "scenario": "rapid_requests", "users": 1_000_000 }),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    // Nothing was seeded by the rejected runs
    let users = app.get("/v1/users").await;
    assert_eq!(users.body, json!([]));
}

#[tokio::test]
async fn test_flight_capacity_is_bounded() {
    let app = TestApp::new();
    let departure = Utc::now() + Duration::days(1);
    let res = app
        .post(
            "/v1/flights",
            json!({
                "origin": "TestCity1",
                "destination": "TestDest1",
                "departure_time": departure,
                "arrival_time": departure + Duration::hours(2),
                "capacity": u32::MAX,
            }),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.get("/v1/flights").await.body, json!([]));
}

#[tokio::test]
async fn test_restore_seats_on_complete_flight() {
    let app = TestApp::new();
    let flight = app.create_flight(4).await;
    let res = app
        .post(&format!("/v1/admin/flights/{}/seats", flight), json!({}))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["inserted"], 0);
}
