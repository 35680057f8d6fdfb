pub mod app_config;
pub mod backend;
pub mod database;
#[cfg(feature = "kafka")]
pub mod events;
pub mod memory;
pub mod redis_repo;

pub use app_config::Config;
pub use backend::{event_sink, open_repositories};
pub use database::PgStore;
#[cfg(feature = "kafka")]
pub use events::KafkaEventSink;
pub use memory::MemoryStore;
pub use redis_repo::RedisSeatStore;
