//! Load harness: concurrent reservation scenarios with fairness analysis.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use seatline_core::{CoreError, CoreResult};

use crate::manager::{ReservationManager, NO_SEATS_AVAILABLE};

/// Minimum share of the top client's successes every client must reach.
pub const FAIRNESS_THRESHOLD: f64 = 0.3;

#[derive(Debug, Default)]
struct Counters {
    successful: usize,
    failed: usize,
    errors: Vec<String>,
    response_times: Vec<Duration>,
    by_client: BTreeMap<usize, usize>,
}

/// Thread-safe outcome recorder shared by every client of a scenario.
#[derive(Debug, Default)]
pub struct LoadStats {
    inner: Mutex<Counters>,
}

/// Snapshot of a [`LoadStats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    pub total_requests: usize,
    pub successful: usize,
    pub failed: usize,
    /// Percent of successful requests.
    pub success_rate: f64,
    pub avg_response_ms: f64,
    pub unique_errors: usize,
    /// Successful reservations per client.
    pub client_distribution: BTreeMap<usize, usize>,
    pub elapsed_ms: u128,
}

impl LoadStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client so that it shows in the distribution even with no
    /// successes.
    pub async fn register_client(&self, client_id: usize) {
        self.inner.lock().await.by_client.entry(client_id).or_insert(0);
    }

    pub async fn record_success(&self, client_id: Option<usize>, elapsed: Duration) {
        let mut c = self.inner.lock().await;
        c.successful += 1;
        c.response_times.push(elapsed);
        if let Some(id) = client_id {
            *c.by_client.entry(id).or_insert(0) += 1;
        }
    }

    pub async fn record_failure(&self, error: String, elapsed: Duration) {
        let mut c = self.inner.lock().await;
        c.failed += 1;
        c.errors.push(error);
        c.response_times.push(elapsed);
    }

    pub async fn report(&self, elapsed: Duration) -> LoadReport {
        let c = self.inner.lock().await;
        let total = c.successful + c.failed;
        let success_rate = if total > 0 {
            c.successful as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        let avg_response_ms = if c.response_times.is_empty() {
            0.0
        } else {
            let sum: Duration = c.response_times.iter().sum();
            sum.as_secs_f64() * 1000.0 / c.response_times.len() as f64
        };

        LoadReport {
            total_requests: total,
            successful: c.successful,
            failed: c.failed,
            success_rate,
            avg_response_ms,
            unique_errors: c.errors.iter().collect::<HashSet<_>>().len(),
            client_distribution: c.by_client.clone(),
            elapsed_ms: elapsed.as_millis(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Fairness {
    Fair { ratio: f64 },
    Imbalanced { ratio: f64 },
    /// At least one client got nothing.
    Starved,
    /// Fewer than two clients to compare.
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FairnessReport {
    pub fairness: Fairness,
    pub seats_reserved: usize,
    pub total_seats: usize,
    pub no_overselling: bool,
}

impl FairnessReport {
    pub fn passed(&self) -> bool {
        self.no_overselling && matches!(self.fairness, Fairness::Fair { .. })
    }
}

/// Judge how evenly successes spread over clients and whether the flight was
/// oversold.
pub fn analyze_fairness(report: &LoadReport, seats_reserved: usize, total_seats: usize) -> FairnessReport {
    let counts: Vec<usize> = report.client_distribution.values().copied().collect();
    let fairness = match (counts.iter().min().copied(), counts.iter().max().copied()) {
        _ if counts.len() < 2 => Fairness::InsufficientData,
        (Some(0), _) => Fairness::Starved,
        (Some(min), Some(max)) => {
            let ratio = min as f64 / max as f64;
            if ratio >= FAIRNESS_THRESHOLD {
                Fairness::Fair { ratio }
            } else {
                Fairness::Imbalanced { ratio }
            }
        }
        _ => Fairness::InsufficientData,
    };

    FairnessReport {
        fairness,
        seats_reserved,
        total_seats,
        no_overselling: seats_reserved <= total_seats,
    }
}

/// Drives a [`ReservationManager`] with the stress scenarios.
pub struct LoadTester {
    manager: Arc<ReservationManager>,
    pause: Duration,
}

impl LoadTester {
    pub fn new(manager: Arc<ReservationManager>) -> Self {
        Self {
            manager,
            pause: Duration::from_millis(10),
        }
    }

    /// Delay between requests of one client. Zero disables it.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// One user, `requests` sequential random-seat reservations.
    pub async fn rapid_requests(&self, user_id: Uuid, flight_id: Uuid, requests: usize) -> LoadReport {
        info!("Rapid requests: user {} making {} attempts on flight {}", user_id, requests, flight_id);
        let stats = LoadStats::new();
        let started = Instant::now();

        for attempt in 1..=requests {
            let t = Instant::now();
            match self.manager.reserve_any(flight_id, user_id).await {
                Ok(r) => {
                    debug!("Attempt {}: reserved seat {}", attempt, r.seat_number);
                    stats.record_success(None, t.elapsed()).await;
                }
                Err(e) => {
                    debug!("Attempt {}: {}", attempt, e);
                    stats.record_failure(e.to_string(), t.elapsed()).await;
                }
            }
            self.sleep(self.pause).await;
        }

        stats.report(started.elapsed()).await
    }

    /// `clients` concurrent clients, each making `per_client` reservations
    /// for a random user on a random flight.
    pub async fn multiple_clients(
        &self,
        users: &[Uuid],
        flights: &[Uuid],
        clients: usize,
        per_client: usize,
    ) -> CoreResult<LoadReport> {
        if users.is_empty() || flights.is_empty() {
            return Err(CoreError::Validation("need at least one user and one flight".to_string()));
        }
        info!("Multiple clients: {} clients x {} requests", clients, per_client);

        let stats = Arc::new(LoadStats::new());
        let users = Arc::new(users.to_vec());
        let flights = Arc::new(flights.to_vec());
        let started = Instant::now();

        let mut handles = Vec::with_capacity(clients);
        for client_id in 0..clients {
            let manager = self.manager.clone();
            let stats = stats.clone();
            let users = users.clone();
            let flights = flights.clone();
            let pause = self.pause;
            handles.push(tokio::spawn(async move {
                stats.register_client(client_id).await;
                let mut reserved = 0;
                for _ in 0..per_client {
                    let (user_id, flight_id, jitter) = {
                        let mut rng = rand::thread_rng();
                        let user_id = *users.choose(&mut rng).unwrap_or(&Uuid::nil());
                        let flight_id = *flights.choose(&mut rng).unwrap_or(&Uuid::nil());
                        (user_id, flight_id, rng.gen_range(1..=5u32))
                    };

                    let t = Instant::now();
                    match manager.reserve_any(flight_id, user_id).await {
                        Ok(_) => {
                            reserved += 1;
                            stats.record_success(Some(client_id), t.elapsed()).await;
                        }
                        Err(e) => stats.record_failure(e.to_string(), t.elapsed()).await,
                    }
                    if !pause.is_zero() {
                        tokio::time::sleep(pause * jitter).await;
                    }
                }
                debug!("Client {} completed: {} successful reservations", client_id, reserved);
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Load client task failed: {}", e);
            }
        }

        Ok(stats.report(started.elapsed()).await)
    }

    /// Two users race to reserve every seat of one flight. Each stops once
    /// the flight reports no seats available.
    pub async fn seat_competition(&self, users: [Uuid; 2], flight_id: Uuid) -> CoreResult<LoadReport> {
        let max_attempts = self.manager.allocator.flight(flight_id).await?.capacity as usize;
        info!(
            "Seat competition: users {} and {} on flight {} ({} seats)",
            users[0], users[1], flight_id, max_attempts
        );

        let stats = Arc::new(LoadStats::new());
        let started = Instant::now();

        let mut handles = Vec::with_capacity(2);
        for (client_id, user_id) in users.into_iter().enumerate() {
            let manager = self.manager.clone();
            let stats = stats.clone();
            // Short pause between attempts keeps both users interleaved.
            let pause = self.pause / 10;
            handles.push(tokio::spawn(async move {
                stats.register_client(client_id).await;
                for _ in 0..max_attempts {
                    let t = Instant::now();
                    match manager.reserve_any(flight_id, user_id).await {
                        Ok(_) => stats.record_success(Some(client_id), t.elapsed()).await,
                        Err(e) => {
                            let sold_out = matches!(&e, CoreError::Conflict(msg) if msg == NO_SEATS_AVAILABLE);
                            stats.record_failure(e.to_string(), t.elapsed()).await;
                            if sold_out {
                                debug!("User {}: no more seats available", user_id);
                                break;
                            }
                        }
                    }
                    if pause.is_zero() {
                        tokio::task::yield_now().await;
                    } else {
                        tokio::time::sleep(pause).await;
                    }
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Competition task failed: {}", e);
            }
        }

        Ok(stats.report(started.elapsed()).await)
    }

    async fn sleep(&self, pause: Duration) {
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use seatline_catalog::{CatalogService, SeatAllocator};
    use seatline_core::events::TracingEventSink;
    use seatline_store::MemoryStore;

    struct Fixture {
        catalog: CatalogService,
        tester: LoadTester,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let catalog = CatalogService::new(store.clone(), store.clone(), store.clone(), store.clone(), 100);
        let allocator = Arc::new(SeatAllocator::new(store.clone(), store.clone()));
        let manager = Arc::new(ReservationManager::new(allocator, store, Arc::new(TracingEventSink)));
        Fixture {
            catalog,
            tester: LoadTester::new(manager).with_pause(Duration::ZERO),
        }
    }

    #[tokio::test]
    async fn test_stats_report() {
        let stats = LoadStats::new();
        stats.register_client(2).await;
        stats.record_success(Some(0), Duration::from_millis(10)).await;
        stats.record_success(Some(0), Duration::from_millis(30)).await;
        stats.record_failure("Conflict: no seats available".to_string(), Duration::from_millis(20)).await;
        stats.record_failure("Conflict: no seats available".to_string(), Duration::from_millis(20)).await;

        let report = stats.report(Duration::from_secs(1)).await;
        assert_eq!(report.total_requests, 4);
        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 2);
        assert!((report.success_rate - 50.0).abs() < f64::EPSILON);
        assert!((report.avg_response_ms - 20.0).abs() < 1e-9);
        assert_eq!(report.unique_errors, 1);
        assert_eq!(report.client_distribution, BTreeMap::from([(0, 2), (2, 0)]));
    }

    #[test]
    fn test_fairness_verdicts() {
        let report = |dist: &[(usize, usize)]| LoadReport {
            total_requests: 0,
            successful: 0,
            failed: 0,
            success_rate: 0.0,
            avg_response_ms: 0.0,
            unique_errors: 0,
            client_distribution: dist.iter().copied().collect(),
            elapsed_ms: 0,
        };

        let fair = analyze_fairness(&report(&[(0, 12), (1, 13)]), 25, 25);
        assert!(matches!(fair.fairness, Fairness::Fair { .. }));
        assert!(fair.passed());

        let skewed = analyze_fairness(&report(&[(0, 2), (1, 23)]), 25, 25);
        assert!(matches!(skewed.fairness, Fairness::Imbalanced { .. }));

        let starved = analyze_fairness(&report(&[(0, 0), (1, 25)]), 25, 25);
        assert_eq!(starved.fairness, Fairness::Starved);

        let single = analyze_fairness(&report(&[(0, 25)]), 25, 25);
        assert_eq!(single.fairness, Fairness::InsufficientData);

        let oversold = analyze_fairness(&report(&[(0, 13), (1, 13)]), 26, 25);
        assert!(!oversold.no_overselling);
        assert!(!oversold.passed());
    }

    #[tokio::test]
    async fn test_rapid_requests_never_oversell() {
        let f = fixture();
        let departure = Utc::now() + ChronoDuration::days(1);
        let flight = f
            .catalog
            .create_flight("TestCity1", "TestDest1", departure, departure + ChronoDuration::hours(2), 5)
            .await
            .unwrap();
        let user = f.catalog.create_user("user1", "user1@test.com").await.unwrap();

        let report = f.tester.rapid_requests(user.id, flight.id, 8).await;
        assert_eq!(report.total_requests, 8);
        assert_eq!(report.successful, 5);
        assert_eq!(report.failed, 3);
        assert_eq!(report.unique_errors, 1);

        let status = f.catalog.flight_status(flight.id).await.unwrap();
        assert_eq!(status.available_seats, 0);
        assert_eq!(status.confirmed_reservations, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_multiple_clients() {
        let f = fixture();
        let fixtures = f.catalog.generate_test_data(5, 2).await.unwrap();

        let report = f
            .tester
            .multiple_clients(&fixtures.user_ids, &fixtures.flight_ids, 4, 10)
            .await
            .unwrap();
        assert_eq!(report.total_requests, 40);
        assert_eq!(report.client_distribution.len(), 4);
        assert_eq!(
            report.client_distribution.values().sum::<usize>(),
            report.successful
        );

        let mut reserved = 0;
        let mut capacity = 0;
        for id in &fixtures.flight_ids {
            let status = f.catalog.flight_status(*id).await.unwrap();
            reserved += status.seats_reserved();
            capacity += status.total_seats;
            assert_eq!(status.seats_reserved(), status.confirmed_reservations);
        }
        assert_eq!(reserved, report.successful);
        assert!(reserved <= capacity);

        let empty = f.tester.multiple_clients(&[], &fixtures.flight_ids, 1, 1).await;
        assert!(matches!(empty, Err(CoreError::Validation(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_seat_competition_fills_flight_exactly() {
        let f = fixture();
        let fixtures = f.catalog.generate_test_data(2, 1).await.unwrap();
        let flight_id = fixtures.flight_ids[0];

        let report = f
            .tester
            .seat_competition([fixtures.user_ids[0], fixtures.user_ids[1]], flight_id)
            .await
            .unwrap();
        assert_eq!(report.successful, 25);

        let status = f.catalog.flight_status(flight_id).await.unwrap();
        assert_eq!(status.available_seats, 0);

        let fairness = analyze_fairness(&report, status.seats_reserved(), status.total_seats);
        assert!(fairness.no_overselling);
        assert_eq!(fairness.seats_reserved, 25);
    }
}
