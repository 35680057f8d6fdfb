use std::error::Error;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use seatline_core::events::{EventSink, TracingEventSink};
use seatline_core::repository::Repositories;

use crate::app_config::{KafkaConfig, SeatLedger, StorageBackend, StorageConfig};
use crate::{MemoryStore, PgStore, RedisSeatStore};

/// Open the configured store backends. The returned handles stay open until
/// `Repositories::close` is called.
pub async fn open_repositories(
    config: &StorageConfig,
) -> Result<Repositories, Box<dyn Error + Send + Sync>> {
    let repos = match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory store");
            Repositories::from_store(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or("storage.database_url is not set")?;
            let acquire_timeout = Duration::from_millis(config.acquire_timeout_ms);
            let store = connect_with_retry("PostgreSQL", config, || {
                PgStore::connect(url, config.max_connections, acquire_timeout)
            })
            .await?;
            if config.run_migrations {
                store.migrate().await?;
            }
            info!("Connected to PostgreSQL (max {} connections)", config.max_connections);
            Repositories::from_store(Arc::new(store))
        }
    };

    match config.seat_ledger {
        SeatLedger::Primary => Ok(repos),
        SeatLedger::Redis => {
            let url = config.redis_url.as_deref().ok_or("storage.redis_url is not set")?;
            let ledger = connect_with_retry("Redis", config, || RedisSeatStore::connect(url)).await?;
            Ok(repos.with_seat_store(Arc::new(ledger)))
        }
    }
}

/// Run `connect` until it succeeds or `connect_retries` extra attempts have
/// failed. The pause before retry n is `connect_retry_delay_ms * 2^n`.
async fn connect_with_retry<T, E, F, Fut>(what: &str, config: &StorageConfig, mut connect: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let base_delay = Duration::from_millis(config.connect_retry_delay_ms);
    let mut attempt: u32 = 0;
    loop {
        match connect().await {
            Ok(conn) => return Ok(conn),
            Err(e) if attempt < config.connect_retries => {
                let delay = base_delay.saturating_mul(2u32.saturating_pow(attempt));
                attempt += 1;
                warn!(
                    "{} connection attempt {}/{} failed: {}; retrying in {:?}",
                    what,
                    attempt,
                    config.connect_retries + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                error!("{} unreachable after {} attempts: {}", what, attempt + 1, e);
                return Err(e);
            }
        }
    }
}

/// Event sink for the configured broker; log-only when none is configured.
pub fn event_sink(kafka: Option<&KafkaConfig>) -> Result<Arc<dyn EventSink>, Box<dyn Error + Send + Sync>> {
    match kafka {
        #[cfg(feature = "kafka")]
        Some(kafka) => {
            info!("Publishing events to Kafka at {}", kafka.brokers);
            Ok(Arc::new(crate::events::KafkaEventSink::new(&kafka.brokers)?))
        }
        #[cfg(not(feature = "kafka"))]
        Some(kafka) => {
            tracing::warn!(
                "Kafka brokers {} configured but the kafka feature is disabled; logging events instead",
                kafka.brokers
            );
            Ok(Arc::new(TracingEventSink))
        }
        None => Ok(Arc::new(TracingEventSink)),
    }
}
