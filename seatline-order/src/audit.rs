use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

use seatline_core::CoreResult;
use seatline_shared::Reservation;

use crate::manager::ReservationManager;

/// One disagreement between the seat map and the reservation records.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Divergence {
    /// Seat taken with no active reservation recording its claim.
    OrphanedClaim {
        seat_number: String,
        reserved_by: Option<Uuid>,
        reserved_at: Option<DateTime<Utc>>,
    },
    /// Active reservation whose seat is not held by its claim.
    MissingClaim {
        reservation_id: Uuid,
        seat_number: String,
    },
    /// Availability flag and reserving user disagree.
    InconsistentSeat { seat_number: String },
    /// More than one active reservation for a seat.
    DuplicateActive {
        seat_number: String,
        reservation_ids: Vec<Uuid>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub flight_id: Uuid,
    pub seats_checked: usize,
    pub reservations_checked: usize,
    pub divergences: Vec<Divergence>,
    pub checked_at: DateTime<Utc>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.divergences.is_empty()
    }
}

impl ReservationManager {
    /// Compare a flight's seat map with its reservations. Read-only.
    ///
    /// The two reads are not one snapshot, so an operation in flight while
    /// the audit runs can show up as a divergence that is gone on the next run.
    pub async fn audit(&self, flight_id: Uuid) -> CoreResult<AuditReport> {
        let seats = self.allocator.seat_map(flight_id).await?;
        let reservations = self.reservations.list_by_flight(flight_id).await?;

        let mut active: BTreeMap<&str, Vec<&Reservation>> = BTreeMap::new();
        for r in reservations.iter().filter(|r| r.status.is_active()) {
            active.entry(r.seat_number.as_str()).or_default().push(r);
        }

        let mut divergences = Vec::new();
        for seat in &seats {
            if !seat.is_consistent() {
                divergences.push(Divergence::InconsistentSeat {
                    seat_number: seat.seat_number.clone(),
                });
            }

            let holders = active.get(seat.seat_number.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            if holders.len() > 1 {
                divergences.push(Divergence::DuplicateActive {
                    seat_number: seat.seat_number.clone(),
                    reservation_ids: holders.iter().map(|r| r.id).collect(),
                });
            }

            if !seat.is_available && !holders.iter().any(|r| seat.is_held_by(&r.claim())) {
                divergences.push(Divergence::OrphanedClaim {
                    seat_number: seat.seat_number.clone(),
                    reserved_by: seat.reserved_by,
                    reserved_at: seat.reserved_at,
                });
            }

            for r in holders.iter().filter(|r| !seat.is_held_by(&r.claim())) {
                divergences.push(Divergence::MissingClaim {
                    reservation_id: r.id,
                    seat_number: r.seat_number.clone(),
                });
            }
        }

        // Active reservations pointing at seats the flight does not have
        for (seat_number, holders) in &active {
            if !seats.iter().any(|s| s.seat_number == *seat_number) {
                for r in holders {
                    divergences.push(Divergence::MissingClaim {
                        reservation_id: r.id,
                        seat_number: r.seat_number.clone(),
                    });
                }
            }
        }

        let report = AuditReport {
            flight_id,
            seats_checked: seats.len(),
            reservations_checked: reservations.len(),
            divergences,
            checked_at: Utc::now(),
        };
        if report.is_clean() {
            info!("Audit of flight {}: {} seats consistent", flight_id, report.seats_checked);
        } else {
            warn!(
                "Audit of flight {}: {} divergences",
                flight_id,
                report.divergences.len()
            );
        }
        Ok(report)
    }
}
