use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::seat::{now_micros, Claim};

/// Reservation status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Canceled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Canceled => "canceled",
        }
    }

    /// Pending and confirmed reservations hold their seat.
    pub fn is_active(&self) -> bool {
        !matches!(self, ReservationStatus::Canceled)
    }

    /// `pending -> confirmed`, `pending -> canceled`, `confirmed -> canceled`.
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        matches!(
            (self, next),
            (ReservationStatus::Pending, ReservationStatus::Confirmed)
                | (ReservationStatus::Pending, ReservationStatus::Canceled)
                | (ReservationStatus::Confirmed, ReservationStatus::Canceled)
        )
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(ReservationStatus::Pending),
            "confirmed" => Ok(ReservationStatus::Confirmed),
            "canceled" | "cancelled" => Ok(ReservationStatus::Canceled),
            other => Err(format!("unknown reservation status: {}", other)),
        }
    }
}

/// A user's reservation of one seat. Derived from the seat claim it records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reservation {
    pub id: Uuid,
    pub flight_id: Uuid,
    pub user_id: Uuid,
    pub seat_number: String,
    pub status: ReservationStatus,
    /// Timestamp of the claim currently held on `seat_number`.
    pub claimed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new(flight_id: Uuid, seat_number: String, claim: Claim, status: ReservationStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            flight_id,
            user_id: claim.user_id,
            seat_number,
            status,
            claimed_at: claim.claimed_at,
            created_at: claim.claimed_at,
            updated_at: now_micros(),
        }
    }

    pub fn claim(&self) -> Claim {
        Claim {
            user_id: self.user_id,
            claimed_at: self.claimed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use ReservationStatus::*;

        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Canceled));
        assert!(Confirmed.can_transition_to(Canceled));

        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Canceled.can_transition_to(Pending));
        assert!(!Canceled.can_transition_to(Confirmed));
        assert!(!Canceled.can_transition_to(Canceled));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("confirmed".parse::<ReservationStatus>(), Ok(ReservationStatus::Confirmed));
        assert_eq!("Cancelled".parse::<ReservationStatus>(), Ok(ReservationStatus::Canceled));
        assert!("waiting".parse::<ReservationStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&ReservationStatus::Pending).unwrap(),
            "\"pending\""
        );
    }

    #[test]
    fn test_reservation_records_claim() {
        let claim = Claim::new(Uuid::new_v4());
        let reservation = Reservation::new(Uuid::new_v4(), "C3".to_string(), claim, ReservationStatus::Confirmed);
        assert_eq!(reservation.claim(), claim);
        assert_eq!(reservation.created_at, claim.claimed_at);
    }
}
