use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::reservation::Reservation;

pub const TOPIC_RESERVATION_CONFIRMED: &str = "reservation.confirmed";
pub const TOPIC_RESERVATION_CANCELED: &str = "reservation.canceled";
pub const TOPIC_SEAT_CHANGED: &str = "reservation.seat_changed";
pub const TOPIC_SEAT_RECONCILE: &str = "seat.reconcile";

/// Domain events emitted by the reservation lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReservationEvent {
    Confirmed {
        reservation_id: Uuid,
        flight_id: Uuid,
        user_id: Uuid,
        seat_number: String,
        timestamp: i64,
    },
    Canceled {
        reservation_id: Uuid,
        flight_id: Uuid,
        user_id: Uuid,
        seat_number: String,
        timestamp: i64,
    },
    SeatChanged {
        reservation_id: Uuid,
        flight_id: Uuid,
        from_seat: String,
        to_seat: String,
        timestamp: i64,
    },
    /// A seat could not be released and needs an operator or reconciler.
    SeatReconcile {
        reservation_id: Option<Uuid>,
        flight_id: Uuid,
        seat_number: String,
        user_id: Uuid,
        reason: String,
        timestamp: i64,
    },
}

impl ReservationEvent {
    pub fn confirmed(reservation: &Reservation) -> Self {
        ReservationEvent::Confirmed {
            reservation_id: reservation.id,
            flight_id: reservation.flight_id,
            user_id: reservation.user_id,
            seat_number: reservation.seat_number.clone(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn canceled(reservation: &Reservation) -> Self {
        ReservationEvent::Canceled {
            reservation_id: reservation.id,
            flight_id: reservation.flight_id,
            user_id: reservation.user_id,
            seat_number: reservation.seat_number.clone(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn topic(&self) -> &'static str {
        match self {
            ReservationEvent::Confirmed { .. } => TOPIC_RESERVATION_CONFIRMED,
            ReservationEvent::Canceled { .. } => TOPIC_RESERVATION_CANCELED,
            ReservationEvent::SeatChanged { .. } => TOPIC_SEAT_CHANGED,
            ReservationEvent::SeatReconcile { .. } => TOPIC_SEAT_RECONCILE,
        }
    }

    /// Partition key. Events of one flight stay ordered.
    pub fn key(&self) -> String {
        match self {
            ReservationEvent::Confirmed { flight_id, .. }
            | ReservationEvent::Canceled { flight_id, .. }
            | ReservationEvent::SeatChanged { flight_id, .. }
            | ReservationEvent::SeatReconcile { flight_id, .. } => flight_id.to_string(),
        }
    }
}
