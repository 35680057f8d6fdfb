use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use seatline_catalog::{ClaimError, ClaimedSeat, SeatAllocator};
use seatline_core::events::EventSink;
use seatline_core::repository::{ReservationStore, StoreError};
use seatline_core::{CoreError, CoreResult, Page};
use seatline_shared::models::seat::now_micros;
use seatline_shared::{Reservation, ReservationEvent, ReservationStatus};

/// Returned by `reserve_any` when no seat could be claimed.
pub const NO_SEATS_AVAILABLE: &str = "no seats available";

const DEFAULT_RANDOM_CANDIDATES: usize = 10;
const DEFAULT_MAX_PAGE_SIZE: usize = 100;

/// Reservation lifecycle manager.
///
/// Sole writer of reservation status. Every status change is a conditional
/// write on the status the manager last read, and the seat claim made through
/// the [`SeatAllocator`] is the source of truth the reservation record is
/// derived from.
pub struct ReservationManager {
    pub(crate) allocator: Arc<SeatAllocator>,
    pub(crate) reservations: Arc<dyn ReservationStore>,
    events: Arc<dyn EventSink>,
    random_candidates: usize,
    max_page_size: usize,
}

impl ReservationManager {
    pub fn new(
        allocator: Arc<SeatAllocator>,
        reservations: Arc<dyn ReservationStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            allocator,
            reservations,
            events,
            random_candidates: DEFAULT_RANDOM_CANDIDATES,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }

    /// How many available seats `reserve_any` draws its candidates from.
    pub fn with_random_candidates(mut self, candidates: usize) -> Self {
        self.random_candidates = candidates.max(1);
        self
    }

    pub fn with_max_page_size(mut self, max_page_size: usize) -> Self {
        self.max_page_size = max_page_size;
        self
    }

    /// Reserve a specific seat. The reservation is created `confirmed`.
    pub async fn reserve(&self, flight_id: Uuid, seat_number: &str, user_id: Uuid) -> CoreResult<Reservation> {
        let claimed = self.allocator.try_claim(flight_id, seat_number, user_id).await?;
        self.record(claimed, ReservationStatus::Confirmed).await
    }

    /// Reserve a specific seat, leaving the reservation `pending` until
    /// [`confirm`](Self::confirm) is called.
    pub async fn hold(&self, flight_id: Uuid, seat_number: &str, user_id: Uuid) -> CoreResult<Reservation> {
        let claimed = self.allocator.try_claim(flight_id, seat_number, user_id).await?;
        self.record(claimed, ReservationStatus::Pending).await
    }

    /// Reserve a random available seat.
    ///
    /// Candidates are drawn from the first available seats in cabin order and
    /// tried in shuffled order, each at most once. Seats lost to competing
    /// claims are skipped.
    pub async fn reserve_any(&self, flight_id: Uuid, user_id: Uuid) -> CoreResult<Reservation> {
        let mut candidates = self
            .allocator
            .available_seats(flight_id, self.random_candidates)
            .await?;
        candidates.shuffle(&mut rand::thread_rng());

        for seat_number in &candidates {
            match self.allocator.try_claim(flight_id, seat_number, user_id).await {
                Ok(claimed) => return self.record(claimed, ReservationStatus::Confirmed).await,
                Err(ClaimError::SeatAlreadyTaken { .. }) => {
                    debug!("Seat {} on flight {} lost to a competitor", seat_number, flight_id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CoreError::Conflict(NO_SEATS_AVAILABLE.to_string()))
    }

    /// Move a pending reservation to `confirmed`.
    pub async fn confirm(&self, reservation_id: Uuid) -> CoreResult<Reservation> {
        let current = self.load(reservation_id).await?;
        if current.status != ReservationStatus::Pending {
            return Err(CoreError::Conflict(format!(
                "reservation {} is {}, not pending",
                reservation_id, current.status
            )));
        }

        let applied = self
            .reservations
            .transition_status(reservation_id, ReservationStatus::Pending, ReservationStatus::Confirmed)
            .await?;
        if !applied {
            return Err(CoreError::Conflict(format!(
                "reservation {} changed concurrently",
                reservation_id
            )));
        }

        let confirmed = self.load(reservation_id).await?;
        info!("Reservation {} confirmed", reservation_id);
        self.publish(ReservationEvent::confirmed(&confirmed)).await;
        Ok(confirmed)
    }

    /// Cancel a reservation and give its seat back.
    ///
    /// The cancellation stands even if the seat release then fails; the
    /// failure is logged and published for reconciliation.
    pub async fn cancel(&self, reservation_id: Uuid) -> CoreResult<Reservation> {
        loop {
            let current = self.load(reservation_id).await?;
            if !current.status.can_transition_to(ReservationStatus::Canceled) {
                return Err(CoreError::Conflict(format!(
                    "reservation {} is already canceled",
                    reservation_id
                )));
            }

            let applied = self
                .reservations
                .transition_status(reservation_id, current.status, ReservationStatus::Canceled)
                .await?;
            if applied {
                break;
            }
            // Status moved on (pending -> confirmed, or a competing cancel); retry against the new value.
            debug!("Reservation {} changed during cancel, re-reading", reservation_id);
        }

        // Seat changes only apply to active reservations, so this read is final.
        let canceled = self.load(reservation_id).await?;
        if let Err(e) = self.release_claim(&canceled).await {
            let seat = ClaimedSeat {
                flight_id: canceled.flight_id,
                seat_number: canceled.seat_number.clone(),
                claim: canceled.claim(),
            };
            self.reconcile(Some(canceled.id), &seat, format!("release after cancel failed: {}", e))
                .await;
        }

        info!("Reservation {} canceled", reservation_id);
        self.publish(ReservationEvent::canceled(&canceled)).await;
        Ok(canceled)
    }

    /// Current record of a reservation.
    ///
    /// An active reservation whose seat is not held by its claim is reported
    /// as `Invariant`, never repaired here.
    pub async fn status(&self, reservation_id: Uuid) -> CoreResult<Reservation> {
        let mut reservation = self.load(reservation_id).await?;
        // A concurrent seat change can make the first read stale; one re-read settles it.
        for attempt in 0..2 {
            if !reservation.status.is_active() || self.holds_seat(&reservation).await? {
                return Ok(reservation);
            }
            let latest = self.load(reservation_id).await?;
            if attempt == 0 && latest != reservation {
                reservation = latest;
                continue;
            }
            break;
        }

        error!(
            "Invariant violated: reservation {} is {} but seat {} on flight {} is not held by its claim",
            reservation.id, reservation.status, reservation.seat_number, reservation.flight_id
        );
        Err(CoreError::Invariant(format!(
            "seat {} of reservation {} is not held by it",
            reservation.seat_number, reservation.id
        )))
    }

    /// Move an active reservation to another seat.
    ///
    /// Claims the new seat, rewrites the reservation if it still records the
    /// old claim, then releases the old seat. If the rewrite does not apply
    /// the new claim is released again.
    pub async fn change_seat(&self, reservation_id: Uuid, new_seat: &str) -> CoreResult<Reservation> {
        let current = self.load(reservation_id).await?;
        if !current.status.is_active() {
            return Err(CoreError::Conflict(format!(
                "reservation {} is canceled",
                reservation_id
            )));
        }

        let flight = self.allocator.flight(current.flight_id).await?;
        let target = flight.seat_number(new_seat).ok_or_else(|| ClaimError::SeatNotFound {
            flight_id: current.flight_id,
            seat_number: new_seat.to_string(),
        })?;
        if target == current.seat_number {
            return Err(CoreError::Validation(format!(
                "reservation {} already holds seat {}",
                reservation_id, target
            )));
        }

        let claimed = self
            .allocator
            .try_claim(current.flight_id, &target, current.user_id)
            .await?;
        let old = ClaimedSeat {
            flight_id: current.flight_id,
            seat_number: current.seat_number.clone(),
            claim: current.claim(),
        };

        let reassigned = self
            .reservations
            .reassign_seat(
                reservation_id,
                &old.seat_number,
                &old.claim,
                &claimed.seat_number,
                &claimed.claim,
            )
            .await;
        match reassigned {
            Ok(true) => {}
            Ok(false) => {
                self.compensate(Some(reservation_id), &claimed, "reservation changed during seat change")
                    .await;
                return Err(CoreError::Conflict(format!(
                    "reservation {} changed concurrently",
                    reservation_id
                )));
            }
            Err(e) => {
                if !self.landed(reservation_id, &claimed).await {
                    self.compensate(Some(reservation_id), &claimed, &e.to_string()).await;
                    return Err(e.into());
                }
                warn!("Seat change of reservation {} applied despite error: {}", reservation_id, e);
            }
        }

        match self.allocator.release(old.flight_id, &old.seat_number, &old.claim).await {
            Ok(true) => {}
            Ok(false) => warn!(
                "Seat {} on flight {} was no longer held by reservation {}",
                old.seat_number, old.flight_id, reservation_id
            ),
            Err(e) => {
                self.reconcile(
                    Some(reservation_id),
                    &old,
                    format!("release of previous seat failed: {}", e),
                )
                .await;
            }
        }

        info!(
            "Reservation {} moved from seat {} to {}",
            reservation_id, old.seat_number, claimed.seat_number
        );
        self.publish(ReservationEvent::SeatChanged {
            reservation_id,
            flight_id: old.flight_id,
            from_seat: old.seat_number,
            to_seat: claimed.seat_number,
            timestamp: now_micros().timestamp(),
        })
        .await;

        self.load(reservation_id).await
    }

    /// Retry the seat release of a canceled reservation. Returns whether a
    /// seat was freed; calling it again after success is a no-op.
    pub async fn retry_release(&self, reservation_id: Uuid) -> CoreResult<bool> {
        let reservation = self.load(reservation_id).await?;
        if reservation.status.is_active() {
            return Err(CoreError::Conflict(format!(
                "reservation {} is still {}",
                reservation_id, reservation.status
            )));
        }

        let released = self.release_claim(&reservation).await?;
        if released {
            info!(
                "Seat {} on flight {} released for canceled reservation {}",
                reservation.seat_number, reservation.flight_id, reservation_id
            );
        }
        Ok(released)
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> CoreResult<Vec<Reservation>> {
        Ok(self.reservations.list_by_user(user_id).await?)
    }

    pub async fn list(&self, page: usize, page_size: usize) -> CoreResult<Vec<Reservation>> {
        let page = Page::new(page, page_size, self.max_page_size)?;
        Ok(self.reservations.list_reservations(page.offset(), page.limit()).await?)
    }

    async fn load(&self, reservation_id: Uuid) -> CoreResult<Reservation> {
        self.reservations
            .get_reservation(reservation_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("reservation {}", reservation_id)))
    }

    /// Write the reservation for a fresh claim, releasing the claim if the
    /// write does not land.
    async fn record(&self, claimed: ClaimedSeat, status: ReservationStatus) -> CoreResult<Reservation> {
        let reservation = Reservation::new(
            claimed.flight_id,
            claimed.seat_number.clone(),
            claimed.claim,
            status,
        );

        if let Err(e) = self.reservations.insert_reservation(&reservation).await {
            if !self.landed(reservation.id, &claimed).await {
                warn!(
                    "Reservation write for seat {} on flight {} failed: {}",
                    claimed.seat_number, claimed.flight_id, e
                );
                self.compensate(None, &claimed, &e.to_string()).await;
                return Err(e.into());
            }
            warn!("Reservation {} written despite error: {}", reservation.id, e);
        }

        info!(
            "Reservation {} {}: seat {} on flight {} for user {}",
            reservation.id, reservation.status, reservation.seat_number, reservation.flight_id, reservation.user_id
        );
        if status == ReservationStatus::Confirmed {
            self.publish(ReservationEvent::confirmed(&reservation)).await;
        }
        Ok(reservation)
    }

    /// Whether the reservation is known to record `claimed` after a write
    /// reported an error.
    async fn landed(&self, reservation_id: Uuid, claimed: &ClaimedSeat) -> bool {
        match self.reservations.get_reservation(reservation_id).await {
            Ok(Some(r)) => r.seat_number == claimed.seat_number && r.claim() == claimed.claim,
            _ => false,
        }
    }

    /// Undo a claim whose reservation write did not apply.
    async fn compensate(&self, reservation_id: Option<Uuid>, claimed: &ClaimedSeat, cause: &str) {
        match self
            .allocator
            .release(claimed.flight_id, &claimed.seat_number, &claimed.claim)
            .await
        {
            Ok(true) => debug!(
                "Released seat {} on flight {} after failed write",
                claimed.seat_number, claimed.flight_id
            ),
            Ok(false) => warn!(
                "Seat {} on flight {} was no longer held by the failed claim",
                claimed.seat_number, claimed.flight_id
            ),
            Err(e) => {
                self.reconcile(
                    reservation_id,
                    claimed,
                    format!("compensating release failed: {} (after: {})", e, cause),
                )
                .await;
            }
        }
    }

    async fn release_claim(&self, reservation: &Reservation) -> Result<bool, StoreError> {
        let released = self
            .allocator
            .release(reservation.flight_id, &reservation.seat_number, &reservation.claim())
            .await?;
        if !released {
            debug!(
                "Seat {} on flight {} already released from reservation {}",
                reservation.seat_number, reservation.flight_id, reservation.id
            );
        }
        Ok(released)
    }

    async fn holds_seat(&self, reservation: &Reservation) -> CoreResult<bool> {
        match self
            .allocator
            .seat(reservation.flight_id, &reservation.seat_number)
            .await
        {
            Ok(seat) => Ok(seat.is_held_by(&reservation.claim())),
            Err(ClaimError::SeatNotFound { .. }) | Err(ClaimError::FlightNotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn reconcile(&self, reservation_id: Option<Uuid>, seat: &ClaimedSeat, reason: String) {
        error!(
            "Inconsistency: seat {} on flight {} still held by user {} ({})",
            seat.seat_number, seat.flight_id, seat.claim.user_id, reason
        );
        self.publish(ReservationEvent::SeatReconcile {
            reservation_id,
            flight_id: seat.flight_id,
            seat_number: seat.seat_number.clone(),
            user_id: seat.claim.user_id,
            reason,
            timestamp: now_micros().timestamp(),
        })
        .await;
    }

    async fn publish(&self, event: ReservationEvent) {
        if let Err(e) = self.events.publish(&event).await {
            warn!("Failed to publish {} event: {}", event.topic(), e);
        }
    }
}
