use std::sync::Arc;

use seatline_core::repository::{FlightStore, SeatStore, StoreError};
use seatline_core::CoreError;
use seatline_shared::{Claim, Flight, Seat};
use tracing::debug;
use uuid::Uuid;

/// A seat successfully taken by a claim.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedSeat {
    pub flight_id: Uuid,
    pub seat_number: String,
    pub claim: Claim,
}

pub type ClaimResult = Result<ClaimedSeat, ClaimError>;

/// Seat allocation engine.
///
/// Sole writer of seat availability. Holds no state of its own: every claim is
/// a single conditional write at the store, so any number of allocators (in
/// this process or others) can race on the same seat and exactly one wins.
pub struct SeatAllocator {
    seats: Arc<dyn SeatStore>,
    flights: Arc<dyn FlightStore>,
}

impl SeatAllocator {
    pub fn new(seats: Arc<dyn SeatStore>, flights: Arc<dyn FlightStore>) -> Self {
        Self { seats, flights }
    }

    /// Claim `seat_number` on `flight_id` for `user_id`.
    ///
    /// Losers of a race observe `SeatAlreadyTaken` and cause no mutation.
    pub async fn try_claim(&self, flight_id: Uuid, seat_number: &str, user_id: Uuid) -> ClaimResult {
        let flight = self.flight(flight_id).await?;
        let seat_number = flight
            .seat_number(seat_number)
            .ok_or_else(|| ClaimError::SeatNotFound {
                flight_id,
                seat_number: seat_number.to_string(),
            })?;

        let claim = Claim::new(user_id);
        if self.seats.claim_if_available(flight_id, &seat_number, &claim).await? {
            debug!("Seat {} on flight {} claimed by {}", seat_number, flight_id, user_id);
            return Ok(ClaimedSeat {
                flight_id,
                seat_number,
                claim,
            });
        }

        // Not applied: find out why without touching the seat.
        match self.seats.get_seat(flight_id, &seat_number).await? {
            Some(_) => Err(ClaimError::SeatAlreadyTaken {
                flight_id,
                seat_number,
            }),
            None => Err(ClaimError::SeatNotFound {
                flight_id,
                seat_number,
            }),
        }
    }

    /// Make a seat available again. Applies only while the seat is still held
    /// by `claim`; returns whether it did.
    pub async fn release(&self, flight_id: Uuid, seat_number: &str, claim: &Claim) -> Result<bool, StoreError> {
        let released = self.seats.release_if_held(flight_id, seat_number, claim).await?;
        if released {
            debug!("Seat {} on flight {} released", seat_number, flight_id);
        }
        Ok(released)
    }

    /// Up to `limit` available seat numbers of a flight.
    pub async fn available_seats(&self, flight_id: Uuid, limit: usize) -> Result<Vec<String>, ClaimError> {
        self.flight(flight_id).await?;
        Ok(self.seats.list_available(flight_id, limit).await?)
    }

    pub async fn seat(&self, flight_id: Uuid, seat_number: &str) -> Result<Seat, ClaimError> {
        let flight = self.flight(flight_id).await?;
        let not_found = || ClaimError::SeatNotFound {
            flight_id,
            seat_number: seat_number.to_string(),
        };
        let canonical = flight.seat_number(seat_number).ok_or_else(not_found)?;
        self.seats.get_seat(flight_id, &canonical).await?.ok_or_else(not_found)
    }

    pub async fn seat_map(&self, flight_id: Uuid) -> Result<Vec<Seat>, ClaimError> {
        self.flight(flight_id).await?;
        Ok(self.seats.list_seats(flight_id).await?)
    }

    pub async fn flight(&self, flight_id: Uuid) -> Result<Flight, ClaimError> {
        self.flights
            .get_flight(flight_id)
            .await?
            .ok_or(ClaimError::FlightNotFound(flight_id))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClaimError {
    #[error("Seat {seat_number} on flight {flight_id} already taken")]
    SeatAlreadyTaken { flight_id: Uuid, seat_number: String },

    #[error("Seat {seat_number} not found on flight {flight_id}")]
    SeatNotFound { flight_id: Uuid, seat_number: String },

    #[error("Flight not found: {0}")]
    FlightNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ClaimError> for CoreError {
    fn from(err: ClaimError) -> Self {
        match err {
            ClaimError::SeatAlreadyTaken { .. } => CoreError::Conflict(err.to_string()),
            ClaimError::SeatNotFound { .. } | ClaimError::FlightNotFound(_) => {
                CoreError::NotFound(err.to_string())
            }
            ClaimError::Store(e) => e.into(),
        }
    }
}
