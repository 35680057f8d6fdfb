use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

/// Where seat availability lives.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SeatLedger {
    /// Same backend as everything else
    #[default]
    Primary,
    Redis,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub seat_ledger: SeatLedger,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
    /// Extra connection attempts at startup, each waiting twice as long as
    /// the one before.
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
    #[serde(default = "default_connect_retry_delay_ms")]
    pub connect_retry_delay_ms: u64,
}

fn default_max_connections() -> u32 { 5 }
fn default_acquire_timeout_ms() -> u64 { 3000 }
fn default_true() -> bool { true }
fn default_connect_retries() -> u32 { 4 }
fn default_connect_retry_delay_ms() -> u64 { 2000 }

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_capacity")]
    pub default_capacity: u32,
    /// Largest cabin a flight may be created with.
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u32,
    #[serde(default = "default_random_seat_candidates")]
    pub random_seat_candidates: usize,
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

fn default_capacity() -> u32 { 150 }
fn default_max_capacity() -> u32 { 1000 }
fn default_random_seat_candidates() -> usize { 10 }
fn default_page_size() -> usize { 10 }
fn default_max_page_size() -> usize { 100 }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            default_capacity: default_capacity(),
            max_capacity: default_max_capacity(),
            random_seat_candidates: default_random_seat_candidates(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `SEATLINE__STORAGE__BACKEND=postgres`
            .add_source(config::Environment::with_prefix("SEATLINE").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.storage.backend == StorageBackend::Postgres && self.storage.database_url.is_none() {
            return Err("storage.database_url is required for the postgres backend".to_string());
        }
        if self.storage.seat_ledger == SeatLedger::Redis && self.storage.redis_url.is_none() {
            return Err("storage.redis_url is required for the redis seat ledger".to_string());
        }
        let rules = &self.business_rules;
        if rules.default_page_size == 0 || rules.default_page_size > rules.max_page_size {
            return Err("business_rules.default_page_size must be within 1..=max_page_size".to_string());
        }
        // Capacity is stored as a signed 32-bit column
        if rules.max_capacity == 0 || rules.max_capacity > i32::MAX as u32 {
            return Err(format!("business_rules.max_capacity must be within 1..={}", i32::MAX));
        }
        if rules.default_capacity == 0 || rules.default_capacity > rules.max_capacity {
            return Err("business_rules.default_capacity must be within 1..=max_capacity".to_string());
        }
        if rules.random_seat_candidates == 0 {
            return Err("business_rules.random_seat_candidates must be at least 1".to_string());
        }
        Ok(())
    }
}
