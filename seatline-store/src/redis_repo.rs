use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use redis::aio::MultiplexedConnection;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use seatline_core::repository::{SeatStore, StoreError, StoreLifecycle, StoreResult};
use seatline_shared::seat_map::seat_index;
use seatline_shared::{Claim, Seat};

const CLAIM_SCRIPT: &str = r#"
    if redis.call("HGET", KEYS[1], "available") == "1" then
        redis.call("HSET", KEYS[1], "available", "0", "reserved_by", ARGV[2], "reserved_at", ARGV[3])
        redis.call("ZREM", KEYS[2], ARGV[1])
        return 1
    end
    return 0
"#;

const RELEASE_SCRIPT: &str = r#"
    if redis.call("HGET", KEYS[1], "available") == "0"
        and redis.call("HGET", KEYS[1], "reserved_by") == ARGV[2]
        and redis.call("HGET", KEYS[1], "reserved_at") == ARGV[3] then
        redis.call("HSET", KEYS[1], "available", "1")
        redis.call("HDEL", KEYS[1], "reserved_by", "reserved_at")
        redis.call("ZADD", KEYS[2], ARGV[4], ARGV[1])
        return 1
    end
    return 0
"#;

// Seeds a seat only if it does not exist yet.
const INSERT_SCRIPT: &str = r#"
    if redis.call("EXISTS", KEYS[1]) == 1 then
        return 0
    end
    redis.call("HSET", KEYS[1], "available", ARGV[3])
    if ARGV[4] ~= "" then
        redis.call("HSET", KEYS[1], "reserved_by", ARGV[4], "reserved_at", ARGV[5])
    end
    redis.call("ZADD", KEYS[2], ARGV[2], ARGV[1])
    if ARGV[3] == "1" then
        redis.call("ZADD", KEYS[3], ARGV[2], ARGV[1])
    end
    return 1
"#;

/// Seat ledger kept in Redis.
///
/// Each seat is a hash at `seat:{flight}:{seat}`. Two sorted sets per flight,
/// scored by cabin position, index every seat and the currently available
/// ones. Claims and releases are Lua scripts, so the check and the write run
/// as one step on the server.
#[derive(Clone)]
pub struct RedisSeatStore {
    conn: MultiplexedConnection,
    claim_script: redis::Script,
    release_script: redis::Script,
    insert_script: redis::Script,
}

impl RedisSeatStore {
    pub async fn connect(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Connected to Redis seat ledger");
        Ok(Self {
            conn,
            claim_script: redis::Script::new(CLAIM_SCRIPT),
            release_script: redis::Script::new(RELEASE_SCRIPT),
            insert_script: redis::Script::new(INSERT_SCRIPT),
        })
    }
}

fn seat_key(flight_id: Uuid, seat_number: &str) -> String {
    format!("seat:{}:{}", flight_id, seat_number)
}

fn seats_key(flight_id: Uuid) -> String {
    format!("flight:{}:seats", flight_id)
}

fn available_key(flight_id: Uuid) -> String {
    format!("flight:{}:available", flight_id)
}

fn score(seat_number: &str) -> u32 {
    seat_index(seat_number).unwrap_or(u32::MAX)
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn redis_error(err: redis::RedisError) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout(err.to_string())
    } else {
        StoreError::Unavailable(err.to_string())
    }
}

fn seat_from_hash(
    flight_id: Uuid,
    seat_number: &str,
    fields: &HashMap<String, String>,
) -> StoreResult<Option<Seat>> {
    if fields.is_empty() {
        return Ok(None);
    }
    let corrupt = |what: &str| StoreError::Corrupt(format!("seat {} on flight {}: {}", seat_number, flight_id, what));

    let is_available = match fields.get("available").map(String::as_str) {
        Some("1") => true,
        Some("0") => false,
        _ => return Err(corrupt("bad availability flag")),
    };
    let reserved_by = fields
        .get("reserved_by")
        .map(|v| Uuid::parse_str(v).map_err(|_| corrupt("bad reserving user")))
        .transpose()?;
    let reserved_at = fields
        .get("reserved_at")
        .map(|v| {
            DateTime::parse_from_rfc3339(v)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|_| corrupt("bad reservation timestamp"))
        })
        .transpose()?;

    Ok(Some(Seat {
        flight_id,
        seat_number: seat_number.to_string(),
        is_available,
        reserved_by,
        reserved_at,
    }))
}

#[async_trait]
impl SeatStore for RedisSeatStore {
    async fn insert_seats(&self, seats: &[Seat]) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        for seat in seats {
            let _: i64 = self
                .insert_script
                .key(seat_key(seat.flight_id, &seat.seat_number))
                .key(seats_key(seat.flight_id))
                .key(available_key(seat.flight_id))
                .arg(&seat.seat_number)
                .arg(score(&seat.seat_number))
                .arg(if seat.is_available { "1" } else { "0" })
                .arg(seat.reserved_by.map(|u| u.to_string()).unwrap_or_default())
                .arg(seat.reserved_at.map(format_timestamp).unwrap_or_default())
                .invoke_async(&mut conn)
                .await
                .map_err(redis_error)?;
        }
        Ok(())
    }

    async fn get_seat(&self, flight_id: Uuid, seat_number: &str) -> StoreResult<Option<Seat>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(seat_key(flight_id, seat_number))
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;
        seat_from_hash(flight_id, seat_number, &fields)
    }

    async fn list_seats(&self, flight_id: Uuid) -> StoreResult<Vec<Seat>> {
        let mut conn = self.conn.clone();
        let numbers: Vec<String> = redis::cmd("ZRANGE")
            .arg(seats_key(flight_id))
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;
        if numbers.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for seat_number in &numbers {
            pipe.cmd("HGETALL").arg(seat_key(flight_id, seat_number));
        }
        let hashes: Vec<HashMap<String, String>> =
            pipe.query_async(&mut conn).await.map_err(redis_error)?;

        let mut seats = Vec::with_capacity(numbers.len());
        for (seat_number, fields) in numbers.iter().zip(hashes.iter()) {
            if let Some(seat) = seat_from_hash(flight_id, seat_number, fields)? {
                seats.push(seat);
            }
        }
        Ok(seats)
    }

    async fn list_available(&self, flight_id: Uuid, limit: usize) -> StoreResult<Vec<String>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let stop = i64::try_from(limit).unwrap_or(i64::MAX) - 1;
        redis::cmd("ZRANGE")
            .arg(available_key(flight_id))
            .arg(0)
            .arg(stop)
            .query_async(&mut conn)
            .await
            .map_err(redis_error)
    }

    async fn claim_if_available(
        &self,
        flight_id: Uuid,
        seat_number: &str,
        claim: &Claim,
    ) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let applied: i64 = self
            .claim_script
            .key(seat_key(flight_id, seat_number))
            .key(available_key(flight_id))
            .arg(seat_number)
            .arg(claim.user_id.to_string())
            .arg(format_timestamp(claim.claimed_at))
            .invoke_async(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(applied == 1)
    }

    async fn release_if_held(
        &self,
        flight_id: Uuid,
        seat_number: &str,
        claim: &Claim,
    ) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let applied: i64 = self
            .release_script
            .key(seat_key(flight_id, seat_number))
            .key(available_key(flight_id))
            .arg(seat_number)
            .arg(claim.user_id.to_string())
            .arg(format_timestamp(claim.claimed_at))
            .arg(score(seat_number))
            .invoke_async(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(applied == 1)
    }
}

#[async_trait]
impl StoreLifecycle for RedisSeatStore {
    async fn health_check(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(())
    }

    async fn close(&self) {
        // The multiplexed connection closes when its last clone drops.
        info!("Releasing Redis seat ledger connection");
    }
}
