//! The storage boundary.
//!
//! Stores offer keyed reads plus conditional writes. Every write that guards
//! shared state (`claim_if_available`, `release_if_held`, `transition_status`,
//! `reassign_seat`) is a compare-and-set executed by the store itself and
//! reports whether it applied; callers never emulate it with a read followed
//! by a write.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use seatline_shared::{Claim, Flight, Reservation, ReservationStatus, Seat, User};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store call timed out: {0}")]
    Timeout(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    /// A schema constraint rejected the write. Stored state disagrees with
    /// what the caller checked, so retrying cannot help.
    #[error("constraint violated: {0}")]
    Constraint(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Repository trait for user accounts
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: &User) -> StoreResult<()>;

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    /// Users ordered by creation time.
    async fn list_users(&self, offset: usize, limit: usize) -> StoreResult<Vec<User>>;
}

/// Repository trait for flights
#[async_trait]
pub trait FlightStore: Send + Sync {
    async fn insert_flight(&self, flight: &Flight) -> StoreResult<()>;

    async fn get_flight(&self, id: Uuid) -> StoreResult<Option<Flight>>;

    /// Flights ordered by departure time.
    async fn list_flights(&self, offset: usize, limit: usize) -> StoreResult<Vec<Flight>>;
}

/// Repository trait for seat availability, keyed by (flight, seat number)
#[async_trait]
pub trait SeatStore: Send + Sync {
    async fn insert_seats(&self, seats: &[Seat]) -> StoreResult<()>;

    async fn get_seat(&self, flight_id: Uuid, seat_number: &str) -> StoreResult<Option<Seat>>;

    /// All seats of a flight in cabin order.
    async fn list_seats(&self, flight_id: Uuid) -> StoreResult<Vec<Seat>>;

    /// Up to `limit` available seat numbers in cabin order.
    async fn list_available(&self, flight_id: Uuid, limit: usize) -> StoreResult<Vec<String>>;

    /// Take the seat for `claim` if it exists and is available.
    async fn claim_if_available(
        &self,
        flight_id: Uuid,
        seat_number: &str,
        claim: &Claim,
    ) -> StoreResult<bool>;

    /// Make the seat available again if it is still held by exactly `claim`.
    async fn release_if_held(
        &self,
        flight_id: Uuid,
        seat_number: &str,
        claim: &Claim,
    ) -> StoreResult<bool>;
}

/// Repository trait for reservation records
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn insert_reservation(&self, reservation: &Reservation) -> StoreResult<()>;

    async fn get_reservation(&self, id: Uuid) -> StoreResult<Option<Reservation>>;

    /// Reservations ordered by creation time.
    async fn list_reservations(&self, offset: usize, limit: usize) -> StoreResult<Vec<Reservation>>;

    async fn list_by_user(&self, user_id: Uuid) -> StoreResult<Vec<Reservation>>;

    async fn list_by_flight(&self, flight_id: Uuid) -> StoreResult<Vec<Reservation>>;

    /// Set `to` if the stored status is still `from`.
    async fn transition_status(
        &self,
        id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> StoreResult<bool>;

    /// Point an active reservation at a new seat and claim, if it still
    /// records `from_seat` held by `from_claim`.
    async fn reassign_seat(
        &self,
        id: Uuid,
        from_seat: &str,
        from_claim: &Claim,
        to_seat: &str,
        to_claim: &Claim,
    ) -> StoreResult<bool>;
}

/// Connection lifecycle of a store backend.
#[async_trait]
pub trait StoreLifecycle: Send + Sync {
    async fn health_check(&self) -> StoreResult<()>;

    /// Close pooled connections. Called once on shutdown.
    async fn close(&self);
}

/// The set of stores a service is wired with.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserStore>,
    pub flights: Arc<dyn FlightStore>,
    pub seats: Arc<dyn SeatStore>,
    pub reservations: Arc<dyn ReservationStore>,
    backends: Vec<Arc<dyn StoreLifecycle>>,
}

impl Repositories {
    /// Wire every repository to one backend.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: UserStore + FlightStore + SeatStore + ReservationStore + StoreLifecycle + 'static,
    {
        let backend: Arc<dyn StoreLifecycle> = store.clone();
        Self {
            users: store.clone(),
            flights: store.clone(),
            seats: store.clone(),
            reservations: store,
            backends: vec![backend],
        }
    }

    /// Move the seat ledger to a separate backend.
    pub fn with_seat_store<S>(mut self, seats: Arc<S>) -> Self
    where
        S: SeatStore + StoreLifecycle + 'static,
    {
        self.seats = seats.clone();
        self.backends.push(seats);
        self
    }

    pub async fn health_check(&self) -> StoreResult<()> {
        for backend in &self.backends {
            backend.health_check().await?;
        }
        Ok(())
    }

    pub async fn close(&self) {
        for backend in &self.backends {
            backend.close().await;
        }
    }
}
