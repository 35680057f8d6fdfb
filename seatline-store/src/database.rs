use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::error::ErrorKind;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use seatline_core::repository::{
    FlightStore, ReservationStore, SeatStore, StoreError, StoreLifecycle, StoreResult, UserStore,
};
use seatline_shared::models::seat::now_micros;
use seatline_shared::seat_map::seat_index;
use seatline_shared::{Claim, Flight, Masked, Reservation, ReservationStatus, Seat, User};

/// PostgreSQL backend. Conditional writes are single `UPDATE ... WHERE`
/// statements whose affected-row count says whether they applied.
#[derive(Clone)]
pub struct PgStore {
    pub pool: PgPool,
}

impl PgStore {
    pub async fn connect(
        connection_string: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

pub(crate) fn store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(ref db)
            if matches!(
                db.kind(),
                ErrorKind::UniqueViolation
                    | ErrorKind::CheckViolation
                    | ErrorKind::ForeignKeyViolation
                    | ErrorKind::NotNullViolation
            ) =>
        {
            StoreError::Constraint(err.to_string())
        }
        sqlx::Error::PoolTimedOut => StoreError::Timeout(err.to_string()),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(err.to_string())
        }
        _ => StoreError::Unavailable(err.to_string()),
    }
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            name: row.name,
            email: Masked(row.email),
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FlightRow {
    id: Uuid,
    origin: String,
    destination: String,
    departure_time: DateTime<Utc>,
    arrival_time: DateTime<Utc>,
    capacity: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<FlightRow> for Flight {
    type Error = StoreError;

    fn try_from(row: FlightRow) -> Result<Self, Self::Error> {
        let capacity = u32::try_from(row.capacity)
            .map_err(|_| StoreError::Corrupt(format!("flight {} has capacity {}", row.id, row.capacity)))?;
        Ok(Flight {
            id: row.id,
            origin: row.origin,
            destination: row.destination,
            departure_time: row.departure_time,
            arrival_time: row.arrival_time,
            capacity,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    flight_id: Uuid,
    seat_number: String,
    is_available: bool,
    reserved_by: Option<Uuid>,
    reserved_at: Option<DateTime<Utc>>,
}

impl From<SeatRow> for Seat {
    fn from(row: SeatRow) -> Self {
        Seat {
            flight_id: row.flight_id,
            seat_number: row.seat_number,
            is_available: row.is_available,
            reserved_by: row.reserved_by,
            reserved_at: row.reserved_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    flight_id: Uuid,
    user_id: Uuid,
    seat_number: String,
    status: String,
    claimed_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = StoreError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<ReservationStatus>()
            .map_err(|e| StoreError::Corrupt(format!("reservation {}: {}", row.id, e)))?;
        Ok(Reservation {
            id: row.id,
            flight_id: row.flight_id,
            user_id: row.user_id,
            seat_number: row.seat_number,
            status,
            claimed_at: row.claimed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const RESERVATION_COLUMNS: &str =
    "id, flight_id, user_id, seat_number, status, claimed_at, created_at, updated_at";

fn reservations(rows: Vec<ReservationRow>) -> StoreResult<Vec<Reservation>> {
    rows.into_iter().map(Reservation::try_from).collect()
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query("INSERT INTO users (id, name, email, created_at) VALUES ($1, $2, $3, $4)")
            .bind(user.id)
            .bind(&user.name)
            .bind(user.email.expose())
            .bind(user.created_at)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(row.map(User::from))
    }

    async fn list_users(&self, offset: usize, limit: usize) -> StoreResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, created_at FROM users ORDER BY created_at, id LIMIT $1 OFFSET $2",
        )
        .bind(to_i64(limit))
        .bind(to_i64(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(rows.into_iter().map(User::from).collect())
    }
}

#[async_trait]
impl FlightStore for PgStore {
    async fn insert_flight(&self, flight: &Flight) -> StoreResult<()> {
        let capacity = i32::try_from(flight.capacity)
            .map_err(|_| StoreError::Corrupt(format!("capacity {} out of range", flight.capacity)))?;
        sqlx::query(
            r#"
            INSERT INTO flights (id, origin, destination, departure_time, arrival_time, capacity, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(flight.id)
        .bind(&flight.origin)
        .bind(&flight.destination)
        .bind(flight.departure_time)
        .bind(flight.arrival_time)
        .bind(capacity)
        .bind(flight.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn get_flight(&self, id: Uuid) -> StoreResult<Option<Flight>> {
        let row = sqlx::query_as::<_, FlightRow>(
            "SELECT id, origin, destination, departure_time, arrival_time, capacity, created_at FROM flights WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        row.map(Flight::try_from).transpose()
    }

    async fn list_flights(&self, offset: usize, limit: usize) -> StoreResult<Vec<Flight>> {
        let rows = sqlx::query_as::<_, FlightRow>(
            r#"
            SELECT id, origin, destination, departure_time, arrival_time, capacity, created_at
            FROM flights
            ORDER BY departure_time, created_at
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(to_i64(limit))
        .bind(to_i64(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        rows.into_iter().map(Flight::try_from).collect()
    }
}

#[async_trait]
impl SeatStore for PgStore {
    async fn insert_seats(&self, seats: &[Seat]) -> StoreResult<()> {
        if seats.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO seats (flight_id, seat_number, seat_index, is_available, reserved_by, reserved_at) ",
        );
        builder.push_values(seats, |mut row, seat| {
            let index = seat_index(&seat.seat_number).map(|i| i as i32).unwrap_or(i32::MAX);
            row.push_bind(seat.flight_id)
                .push_bind(seat.seat_number.clone())
                .push_bind(index)
                .push_bind(seat.is_available)
                .push_bind(seat.reserved_by)
                .push_bind(seat.reserved_at);
        });
        builder.push(" ON CONFLICT (flight_id, seat_number) DO NOTHING");

        builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn get_seat(&self, flight_id: Uuid, seat_number: &str) -> StoreResult<Option<Seat>> {
        let row = sqlx::query_as::<_, SeatRow>(
            r#"
            SELECT flight_id, seat_number, is_available, reserved_by, reserved_at
            FROM seats WHERE flight_id = $1 AND seat_number = $2
            "#,
        )
        .bind(flight_id)
        .bind(seat_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(row.map(Seat::from))
    }

    async fn list_seats(&self, flight_id: Uuid) -> StoreResult<Vec<Seat>> {
        let rows = sqlx::query_as::<_, SeatRow>(
            r#"
            SELECT flight_id, seat_number, is_available, reserved_by, reserved_at
            FROM seats WHERE flight_id = $1 ORDER BY seat_index
            "#,
        )
        .bind(flight_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(rows.into_iter().map(Seat::from).collect())
    }

    async fn list_available(&self, flight_id: Uuid, limit: usize) -> StoreResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT seat_number FROM seats
            WHERE flight_id = $1 AND is_available
            ORDER BY seat_index
            LIMIT $2
            "#,
        )
        .bind(flight_id)
        .bind(to_i64(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(rows.into_iter().map(|(seat_number,)| seat_number).collect())
    }

    async fn claim_if_available(
        &self,
        flight_id: Uuid,
        seat_number: &str,
        claim: &Claim,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE seats
            SET is_available = FALSE, reserved_by = $3, reserved_at = $4
            WHERE flight_id = $1 AND seat_number = $2 AND is_available
            "#,
        )
        .bind(flight_id)
        .bind(seat_number)
        .bind(claim.user_id)
        .bind(claim.claimed_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_if_held(
        &self,
        flight_id: Uuid,
        seat_number: &str,
        claim: &Claim,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE seats
            SET is_available = TRUE, reserved_by = NULL, reserved_at = NULL
            WHERE flight_id = $1 AND seat_number = $2
              AND NOT is_available AND reserved_by = $3 AND reserved_at = $4
            "#,
        )
        .bind(flight_id)
        .bind(seat_number)
        .bind(claim.user_id)
        .bind(claim.claimed_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl ReservationStore for PgStore {
    async fn insert_reservation(&self, reservation: &Reservation) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reservations (id, flight_id, user_id, seat_number, status, claimed_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(reservation.id)
        .bind(reservation.flight_id)
        .bind(reservation.user_id)
        .bind(&reservation.seat_number)
        .bind(reservation.status.as_str())
        .bind(reservation.claimed_at)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn get_reservation(&self, id: Uuid) -> StoreResult<Option<Reservation>> {
        let sql = format!("SELECT {} FROM reservations WHERE id = $1", RESERVATION_COLUMNS);
        let row = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        row.map(Reservation::try_from).transpose()
    }

    async fn list_reservations(&self, offset: usize, limit: usize) -> StoreResult<Vec<Reservation>> {
        let sql = format!(
            "SELECT {} FROM reservations ORDER BY created_at, id LIMIT $1 OFFSET $2",
            RESERVATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(to_i64(limit))
            .bind(to_i64(offset))
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        reservations(rows)
    }

    async fn list_by_user(&self, user_id: Uuid) -> StoreResult<Vec<Reservation>> {
        let sql = format!(
            "SELECT {} FROM reservations WHERE user_id = $1 ORDER BY created_at, id",
            RESERVATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        reservations(rows)
    }

    async fn list_by_flight(&self, flight_id: Uuid) -> StoreResult<Vec<Reservation>> {
        let sql = format!(
            "SELECT {} FROM reservations WHERE flight_id = $1 ORDER BY created_at, id",
            RESERVATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(flight_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        reservations(rows)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE reservations SET status = $3, updated_at = $4 WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(now_micros())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn reassign_seat(
        &self,
        id: Uuid,
        from_seat: &str,
        from_claim: &Claim,
        to_seat: &str,
        to_claim: &Claim,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE reservations
            SET seat_number = $5, user_id = $6, claimed_at = $7, updated_at = $8
            WHERE id = $1 AND seat_number = $2 AND user_id = $3 AND claimed_at = $4
              AND status IN ('pending', 'confirmed')
            "#,
        )
        .bind(id)
        .bind(from_seat)
        .bind(from_claim.user_id)
        .bind(from_claim.claimed_at)
        .bind(to_seat)
        .bind(to_claim.user_id)
        .bind(to_claim.claimed_at)
        .bind(now_micros())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl StoreLifecycle for PgStore {
    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn close(&self) {
        info!("Closing database pool");
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::DatabaseError;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct FakeDbError(ErrorKind, &'static str);

    impl fmt::Display for FakeDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.1)
        }
    }

    impl StdError for FakeDbError {}

    impl DatabaseError for FakeDbError {
        fn message(&self) -> &str {
            self.1
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            match self.0 {
                ErrorKind::UniqueViolation => ErrorKind::UniqueViolation,
                ErrorKind::CheckViolation => ErrorKind::CheckViolation,
                _ => ErrorKind::Other,
            }
        }
    }

    #[test]
    fn test_constraint_violations_are_not_transient() {
        let unique = sqlx::Error::Database(Box::new(FakeDbError(
            ErrorKind::UniqueViolation,
            "duplicate key value violates unique constraint \"uq_reservations_active_seat\"",
        )));
        let mapped = store_error(unique);
        assert!(matches!(&mapped, StoreError::Constraint(msg) if msg.contains("uq_reservations_active_seat")));
        assert!(matches!(
            seatline_core::CoreError::from(mapped),
            seatline_core::CoreError::Invariant(_)
        ));

        let check = sqlx::Error::Database(Box::new(FakeDbError(ErrorKind::CheckViolation, "seats_consistent")));
        assert!(matches!(store_error(check), StoreError::Constraint(_)));

        let other = sqlx::Error::Database(Box::new(FakeDbError(ErrorKind::Other, "deadlock detected")));
        assert!(matches!(store_error(other), StoreError::Unavailable(_)));
    }

    #[test]
    fn test_pool_timeout_is_transient() {
        assert!(matches!(store_error(sqlx::Error::PoolTimedOut), StoreError::Timeout(_)));
        assert!(matches!(store_error(sqlx::Error::PoolClosed), StoreError::Unavailable(_)));
        assert!(matches!(
            store_error(sqlx::Error::ColumnNotFound("status".to_string())),
            StoreError::Corrupt(_)
        ));
    }

    #[test]
    fn test_unknown_status_is_corrupt() {
        let now = now_micros();
        let row = ReservationRow {
            id: Uuid::new_v4(),
            flight_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            seat_number: "A1".to_string(),
            status: "teleported".to_string(),
            claimed_at: now,
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(Reservation::try_from(row), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_negative_capacity_is_corrupt() {
        let now = now_micros();
        let row = FlightRow {
            id: Uuid::new_v4(),
            origin: "TestCity1".to_string(),
            destination: "TestDest1".to_string(),
            departure_time: now,
            arrival_time: now,
            capacity: -1,
            created_at: now,
        };
        assert!(matches!(Flight::try_from(row), Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL pointing at a disposable PostgreSQL"]
    async fn test_concurrent_claims_on_postgres() {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return;
        };
        let store = PgStore::connect(&url, 16, Duration::from_secs(5)).await.unwrap();
        store.migrate().await.unwrap();

        let departure = now_micros() + chrono::Duration::days(1);
        let flight = Flight::new(
            "TestCity1".to_string(),
            "TestDest1".to_string(),
            departure,
            departure + chrono::Duration::hours(2),
            6,
        );
        store.insert_flight(&flight).await.unwrap();
        let seats: Vec<Seat> = flight.seat_numbers().map(|n| Seat::available(flight.id, n)).collect();
        store.insert_seats(&seats).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            let flight_id = flight.id;
            handles.push(tokio::spawn(async move {
                let claim = Claim::new(Uuid::new_v4());
                store.claim_if_available(flight_id, "A1", &claim).await.map(|won| (won, claim))
            }));
        }
        let mut winners = Vec::new();
        for handle in handles {
            let (won, claim) = handle.await.unwrap().unwrap();
            if won {
                winners.push(claim);
            }
        }
        assert_eq!(winners.len(), 1);

        let seat = store.get_seat(flight.id, "A1").await.unwrap().unwrap();
        assert!(seat.is_consistent());
        assert!(seat.is_held_by(&winners[0]));
        assert!(!store.release_if_held(flight.id, "A1", &Claim::new(winners[0].user_id)).await.unwrap());
        assert!(store.release_if_held(flight.id, "A1", &winners[0]).await.unwrap());
        store.pool.close().await;
    }
}
