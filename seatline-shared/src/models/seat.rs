use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

/// Timestamp (in microseconds) of the latest claim issued by this process.
static LAST_CLAIM_MICROS: AtomicI64 = AtomicI64::new(0);

/// Current time at the precision every store round-trips (microseconds).
pub fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Attribution recorded on a seat by a successful claim.
///
/// A release only applies while the seat still carries the exact claim that
/// is being released, so a stale release can never free a newer claim by the
/// same user. Claims issued by one process carry strictly increasing
/// timestamps, so two claims never compare equal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Claim {
    pub user_id: Uuid,
    pub claimed_at: DateTime<Utc>,
}

impl Claim {
    pub fn new(user_id: Uuid) -> Self {
        let now = now_micros();
        let now_us = now.timestamp_micros();
        let claimed_at = match LAST_CLAIM_MICROS.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now_us.max(last + 1))
        }) {
            Ok(last) if last >= now_us => DateTime::from_timestamp_micros(last + 1).unwrap_or(now),
            _ => now,
        };
        Self { user_id, claimed_at }
    }
}

/// Availability record of one seat, keyed by (flight, seat number).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Seat {
    pub flight_id: Uuid,
    pub seat_number: String,
    pub is_available: bool,
    pub reserved_by: Option<Uuid>,
    pub reserved_at: Option<DateTime<Utc>>,
}

impl Seat {
    pub fn available(flight_id: Uuid, seat_number: String) -> Self {
        Self {
            flight_id,
            seat_number,
            is_available: true,
            reserved_by: None,
            reserved_at: None,
        }
    }

    /// The claim currently holding this seat.
    pub fn holder(&self) -> Option<Claim> {
        if self.is_available {
            return None;
        }
        match (self.reserved_by, self.reserved_at) {
            (Some(user_id), Some(claimed_at)) => Some(Claim { user_id, claimed_at }),
            _ => None,
        }
    }

    /// Reserving user is set if and only if the seat is taken.
    pub fn is_consistent(&self) -> bool {
        self.is_available == self.reserved_by.is_none()
            && self.reserved_by.is_some() == self.reserved_at.is_some()
    }

    pub fn is_held_by(&self, claim: &Claim) -> bool {
        self.holder().as_ref() == Some(claim)
    }
}
