use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use seatline_core::repository::{FlightStore, ReservationStore, SeatStore, UserStore};
use seatline_core::{CoreError, CoreResult, Page};
use seatline_shared::{Flight, ReservationStatus, Seat, User};

/// Seats per bulk insert when a flight's cabin is initialized.
const SEAT_BATCH: usize = 500;

/// Largest cabin accepted unless configured otherwise.
pub const DEFAULT_MAX_CAPACITY: u32 = 1000;

/// Capacities of the fixture flights (small, medium, large, extra).
const FIXTURE_CAPACITIES: [u32; 4] = [25, 30, 50, 40];

/// Seat availability summary of one flight.
#[derive(Debug, Clone, Serialize)]
pub struct FlightStatus {
    pub flight: Flight,
    pub total_seats: usize,
    pub available_seats: usize,
    pub confirmed_reservations: usize,
}

impl FlightStatus {
    pub fn seats_reserved(&self) -> usize {
        self.total_seats - self.available_seats
    }
}

/// Users and flights created by [`CatalogService::generate_test_data`].
#[derive(Debug, Clone, Serialize)]
pub struct Fixtures {
    pub user_ids: Vec<Uuid>,
    pub flight_ids: Vec<Uuid>,
}

/// User and flight management.
pub struct CatalogService {
    users: Arc<dyn UserStore>,
    flights: Arc<dyn FlightStore>,
    seats: Arc<dyn SeatStore>,
    reservations: Arc<dyn ReservationStore>,
    max_page_size: usize,
    max_capacity: u32,
}

impl CatalogService {
    pub fn new(
        users: Arc<dyn UserStore>,
        flights: Arc<dyn FlightStore>,
        seats: Arc<dyn SeatStore>,
        reservations: Arc<dyn ReservationStore>,
        max_page_size: usize,
    ) -> Self {
        Self {
            users,
            flights,
            seats,
            reservations,
            max_page_size,
            max_capacity: DEFAULT_MAX_CAPACITY,
        }
    }

    pub fn with_max_capacity(mut self, max_capacity: u32) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    pub async fn create_user(&self, name: &str, email: &str) -> CoreResult<User> {
        let name = name.trim();
        let email = email.trim();
        if name.is_empty() {
            return Err(CoreError::Validation("name must not be empty".to_string()));
        }
        if !email.contains('@') {
            return Err(CoreError::Validation(format!("invalid email address for {}", name)));
        }

        let user = User::new(name.to_string(), email.to_string());
        self.users.insert_user(&user).await?;
        info!("User created: {} (ID: {})", user.name, user.id);
        Ok(user)
    }

    pub async fn user(&self, id: Uuid) -> CoreResult<User> {
        self.users
            .get_user(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("user {}", id)))
    }

    pub async fn list_users(&self, page: usize, page_size: usize) -> CoreResult<Vec<User>> {
        let page = Page::new(page, page_size, self.max_page_size)?;
        Ok(self.users.list_users(page.offset(), page.limit()).await?)
    }

    /// Create a flight and initialize every seat of its cabin as available.
    pub async fn create_flight(
        &self,
        origin: &str,
        destination: &str,
        departure_time: DateTime<Utc>,
        arrival_time: DateTime<Utc>,
        capacity: u32,
    ) -> CoreResult<Flight> {
        let origin = origin.trim();
        let destination = destination.trim();
        if origin.is_empty() || destination.is_empty() {
            return Err(CoreError::Validation("origin and destination are required".to_string()));
        }
        if capacity == 0 || capacity > self.max_capacity {
            return Err(CoreError::Validation(format!(
                "capacity must be between 1 and {}",
                self.max_capacity
            )));
        }
        if arrival_time < departure_time {
            return Err(CoreError::Validation("arrival precedes departure".to_string()));
        }

        let flight = Flight::new(
            origin.to_string(),
            destination.to_string(),
            departure_time,
            arrival_time,
            capacity,
        );
        self.flights.insert_flight(&flight).await?;

        let seats: Vec<Seat> = flight
            .seat_numbers()
            .map(|seat_number| Seat::available(flight.id, seat_number))
            .collect();
        for batch in seats.chunks(SEAT_BATCH) {
            if let Err(e) = self.seats.insert_seats(batch).await {
                // The flight row exists; claims on missing seats report SeatNotFound
                // until `ensure_seats` fills the cabin in.
                error!(
                    "Seat initialization failed for flight {}, cabin incomplete: {}",
                    flight.id, e
                );
                return Err(e.into());
            }
        }

        info!(
            "Flight created: {} -> {} with {} seats (ID: {})",
            flight.origin, flight.destination, capacity, flight.id
        );
        Ok(flight)
    }

    /// Insert any seat of the flight's cabin that is missing from the seat
    /// map. Existing seats are left untouched. Returns how many were added.
    pub async fn ensure_seats(&self, flight_id: Uuid) -> CoreResult<usize> {
        let flight = self.flight(flight_id).await?;
        let present: HashSet<String> = self
            .seats
            .list_seats(flight_id)
            .await?
            .into_iter()
            .map(|s| s.seat_number)
            .collect();

        let missing: Vec<Seat> = flight
            .seat_numbers()
            .filter(|n| !present.contains(n))
            .map(|n| Seat::available(flight_id, n))
            .collect();
        for batch in missing.chunks(SEAT_BATCH) {
            self.seats.insert_seats(batch).await?;
        }

        if !missing.is_empty() {
            warn!("Restored {} missing seats on flight {}", missing.len(), flight_id);
        }
        Ok(missing.len())
    }

    pub async fn flight(&self, id: Uuid) -> CoreResult<Flight> {
        self.flights
            .get_flight(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("flight {}", id)))
    }

    pub async fn list_flights(&self, page: usize, page_size: usize) -> CoreResult<Vec<Flight>> {
        let page = Page::new(page, page_size, self.max_page_size)?;
        Ok(self.flights.list_flights(page.offset(), page.limit()).await?)
    }

    /// Availability computed from the seat map itself.
    pub async fn flight_status(&self, id: Uuid) -> CoreResult<FlightStatus> {
        let flight = self.flight(id).await?;
        let seats = self.seats.list_seats(id).await?;
        let reservations = self.reservations.list_by_flight(id).await?;

        let available_seats = seats.iter().filter(|s| s.is_available).count();
        let confirmed_reservations = reservations
            .iter()
            .filter(|r| r.status == ReservationStatus::Confirmed)
            .count();

        Ok(FlightStatus {
            flight,
            total_seats: seats.len(),
            available_seats,
            confirmed_reservations,
        })
    }

    /// Sample users and flights for load testing.
    pub async fn generate_test_data(&self, num_users: usize, num_flights: usize) -> CoreResult<Fixtures> {
        let mut user_ids = Vec::with_capacity(num_users);
        for i in 1..=num_users {
            let user = self
                .create_user(&format!("user{}", i), &format!("user{}@test.com", i))
                .await?;
            user_ids.push(user.id);
        }

        let mut flight_ids = Vec::new();
        for (i, capacity) in FIXTURE_CAPACITIES.iter().take(num_flights).enumerate() {
            let departure = Utc::now() + Duration::days(i as i64 + 1) + Duration::hours(i as i64 * 2);
            let arrival = departure + Duration::minutes(120 + 30 * i as i64);
            let flight = self
                .create_flight(
                    &format!("TestCity{}", i + 1),
                    &format!("TestDest{}", i + 1),
                    departure,
                    arrival,
                    *capacity,
                )
                .await?;
            flight_ids.push(flight.id);
        }

        info!("Generated {} users and {} flights", user_ids.len(), flight_ids.len());
        Ok(Fixtures { user_ids, flight_ids })
    }
}
