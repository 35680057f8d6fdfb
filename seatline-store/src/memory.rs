use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use uuid::Uuid;

use seatline_core::repository::{
    FlightStore, ReservationStore, SeatStore, StoreError, StoreLifecycle, StoreResult, UserStore,
};
use seatline_shared::models::seat::now_micros;
use seatline_shared::seat_map::seat_index;
use seatline_shared::{Claim, Flight, Reservation, ReservationStatus, Seat, User};

struct Entry<T> {
    seq: u64,
    value: T,
}

/// In-process store for tests and single-node demos.
///
/// Conditional writes run under the shard lock of the entry they guard, which
/// gives the same all-or-nothing semantics a database conditional update has.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<Uuid, Entry<User>>,
    flights: DashMap<Uuid, Entry<Flight>>,
    seats: DashMap<(Uuid, String), Seat>,
    reservations: DashMap<Uuid, Entry<Reservation>>,
    seq: AtomicU64,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store closed".to_string()));
        }
        Ok(())
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    fn page<T: Clone>(mut rows: Vec<(u64, T)>, offset: usize, limit: usize) -> Vec<T> {
        rows.sort_by_key(|(seq, _)| *seq);
        rows.into_iter().skip(offset).take(limit).map(|(_, v)| v).collect()
    }

    fn cabin_order(seats: &mut [Seat]) {
        seats.sort_by_key(|s| seat_index(&s.seat_number).unwrap_or(u32::MAX));
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        self.check_open()?;
        let seq = self.next_seq();
        self.users.insert(user.id, Entry { seq, value: user.clone() });
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        self.check_open()?;
        Ok(self.users.get(&id).map(|e| e.value.clone()))
    }

    async fn list_users(&self, offset: usize, limit: usize) -> StoreResult<Vec<User>> {
        self.check_open()?;
        let rows = self.users.iter().map(|e| (e.seq, e.value.clone())).collect();
        Ok(Self::page(rows, offset, limit))
    }
}

#[async_trait]
impl FlightStore for MemoryStore {
    async fn insert_flight(&self, flight: &Flight) -> StoreResult<()> {
        self.check_open()?;
        let seq = self.next_seq();
        self.flights.insert(flight.id, Entry { seq, value: flight.clone() });
        Ok(())
    }

    async fn get_flight(&self, id: Uuid) -> StoreResult<Option<Flight>> {
        self.check_open()?;
        Ok(self.flights.get(&id).map(|e| e.value.clone()))
    }

    async fn list_flights(&self, offset: usize, limit: usize) -> StoreResult<Vec<Flight>> {
        self.check_open()?;
        let mut rows: Vec<(u64, Flight)> = self.flights.iter().map(|e| (e.seq, e.value.clone())).collect();
        rows.sort_by(|(a_seq, a), (b_seq, b)| {
            a.departure_time.cmp(&b.departure_time).then(a_seq.cmp(b_seq))
        });
        Ok(rows.into_iter().skip(offset).take(limit).map(|(_, f)| f).collect())
    }
}

#[async_trait]
impl SeatStore for MemoryStore {
    async fn insert_seats(&self, seats: &[Seat]) -> StoreResult<()> {
        self.check_open()?;
        for seat in seats {
            self.seats
                .entry((seat.flight_id, seat.seat_number.clone()))
                .or_insert_with(|| seat.clone());
        }
        Ok(())
    }

    async fn get_seat(&self, flight_id: Uuid, seat_number: &str) -> StoreResult<Option<Seat>> {
        self.check_open()?;
        Ok(self
            .seats
            .get(&(flight_id, seat_number.to_string()))
            .map(|s| s.clone()))
    }

    async fn list_seats(&self, flight_id: Uuid) -> StoreResult<Vec<Seat>> {
        self.check_open()?;
        let mut seats: Vec<Seat> = self
            .seats
            .iter()
            .filter(|s| s.flight_id == flight_id)
            .map(|s| s.clone())
            .collect();
        Self::cabin_order(&mut seats);
        Ok(seats)
    }

    async fn list_available(&self, flight_id: Uuid, limit: usize) -> StoreResult<Vec<String>> {
        self.check_open()?;
        let mut seats: Vec<Seat> = self
            .seats
            .iter()
            .filter(|s| s.flight_id == flight_id && s.is_available)
            .map(|s| s.clone())
            .collect();
        Self::cabin_order(&mut seats);
        Ok(seats.into_iter().take(limit).map(|s| s.seat_number).collect())
    }

    async fn claim_if_available(
        &self,
        flight_id: Uuid,
        seat_number: &str,
        claim: &Claim,
    ) -> StoreResult<bool> {
        self.check_open()?;
        let Some(mut seat) = self.seats.get_mut(&(flight_id, seat_number.to_string())) else {
            return Ok(false);
        };
        if !seat.is_available {
            return Ok(false);
        }
        seat.is_available = false;
        seat.reserved_by = Some(claim.user_id);
        seat.reserved_at = Some(claim.claimed_at);
        Ok(true)
    }

    async fn release_if_held(
        &self,
        flight_id: Uuid,
        seat_number: &str,
        claim: &Claim,
    ) -> StoreResult<bool> {
        self.check_open()?;
        let Some(mut seat) = self.seats.get_mut(&(flight_id, seat_number.to_string())) else {
            return Ok(false);
        };
        if !seat.is_held_by(claim) {
            return Ok(false);
        }
        seat.is_available = true;
        seat.reserved_by = None;
        seat.reserved_at = None;
        Ok(true)
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn insert_reservation(&self, reservation: &Reservation) -> StoreResult<()> {
        self.check_open()?;
        let seq = self.next_seq();
        self.reservations.insert(
            reservation.id,
            Entry {
                seq,
                value: reservation.clone(),
            },
        );
        Ok(())
    }

    async fn get_reservation(&self, id: Uuid) -> StoreResult<Option<Reservation>> {
        self.check_open()?;
        Ok(self.reservations.get(&id).map(|e| e.value.clone()))
    }

    async fn list_reservations(&self, offset: usize, limit: usize) -> StoreResult<Vec<Reservation>> {
        self.check_open()?;
        let rows = self.reservations.iter().map(|e| (e.seq, e.value.clone())).collect();
        Ok(Self::page(rows, offset, limit))
    }

    async fn list_by_user(&self, user_id: Uuid) -> StoreResult<Vec<Reservation>> {
        self.check_open()?;
        let rows = self
            .reservations
            .iter()
            .filter(|e| e.value.user_id == user_id)
            .map(|e| (e.seq, e.value.clone()))
            .collect();
        Ok(Self::page(rows, 0, usize::MAX))
    }

    async fn list_by_flight(&self, flight_id: Uuid) -> StoreResult<Vec<Reservation>> {
        self.check_open()?;
        let rows = self
            .reservations
            .iter()
            .filter(|e| e.value.flight_id == flight_id)
            .map(|e| (e.seq, e.value.clone()))
            .collect();
        Ok(Self::page(rows, 0, usize::MAX))
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> StoreResult<bool> {
        self.check_open()?;
        let Some(mut entry) = self.reservations.get_mut(&id) else {
            return Ok(false);
        };
        if entry.value.status != from {
            return Ok(false);
        }
        entry.value.status = to;
        entry.value.updated_at = now_micros();
        Ok(true)
    }

    async fn reassign_seat(
        &self,
        id: Uuid,
        from_seat: &str,
        from_claim: &Claim,
        to_seat: &str,
        to_claim: &Claim,
    ) -> StoreResult<bool> {
        self.check_open()?;
        let Some(mut entry) = self.reservations.get_mut(&id) else {
            return Ok(false);
        };
        let current = &entry.value;
        if !current.status.is_active() || current.seat_number != from_seat || current.claim() != *from_claim {
            return Ok(false);
        }
        entry.value.seat_number = to_seat.to_string();
        entry.value.user_id = to_claim.user_id;
        entry.value.claimed_at = to_claim.claimed_at;
        entry.value.updated_at = now_micros();
        Ok(true)
    }
}

#[async_trait]
impl StoreLifecycle for MemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        self.check_open()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_conditional_writes() {
        let store = MemoryStore::new();
        let flight_id = Uuid::new_v4();
        store
            .insert_seats(&[Seat::available(flight_id, "A1".to_string())])
            .await
            .unwrap();

        let first = Claim::new(Uuid::new_v4());
        let second = Claim::new(Uuid::new_v4());
        assert!(store.claim_if_available(flight_id, "A1", &first).await.unwrap());
        assert!(!store.claim_if_available(flight_id, "A1", &second).await.unwrap());
        assert!(!store.claim_if_available(flight_id, "A2", &second).await.unwrap());

        assert!(!store.release_if_held(flight_id, "A1", &second).await.unwrap());
        assert!(store.release_if_held(flight_id, "A1", &first).await.unwrap());
        assert!(!store.release_if_held(flight_id, "A1", &first).await.unwrap());

        let seat = store.get_seat(flight_id, "A1").await.unwrap().unwrap();
        assert!(seat.is_available && seat.is_consistent());
    }

    #[tokio::test]
    async fn test_status_compare_and_set() {
        let store = MemoryStore::new();
        let reservation = Reservation::new(
            Uuid::new_v4(),
            "A1".to_string(),
            Claim::new(Uuid::new_v4()),
            ReservationStatus::Pending,
        );
        store.insert_reservation(&reservation).await.unwrap();

        assert!(store
            .transition_status(reservation.id, ReservationStatus::Pending, ReservationStatus::Confirmed)
            .await
            .unwrap());
        assert!(!store
            .transition_status(reservation.id, ReservationStatus::Pending, ReservationStatus::Canceled)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_closed_store_is_unavailable() {
        let store = MemoryStore::new();
        store.health_check().await.unwrap();
        store.close().await;
        assert!(matches!(
            store.get_user(Uuid::new_v4()).await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
