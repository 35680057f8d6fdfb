use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use seatline_core::{CoreError, CoreResult};

/// Prometheus counters for reservation outcomes.
pub struct Metrics {
    registry: Registry,
    outcomes: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let outcomes = IntCounterVec::new(
            Opts::new("seatline_reservation_outcomes_total", "Reservation operations by outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(outcomes.clone()))?;
        Ok(Self { registry, outcomes })
    }

    pub fn observe<T>(&self, operation: &str, result: &CoreResult<T>) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(CoreError::Conflict(_)) => "conflict",
            Err(CoreError::NotFound(_)) => "not_found",
            Err(CoreError::Validation(_)) => "validation",
            Err(e) if e.is_retryable() => "transient",
            Err(_) => "invariant",
        };
        if let Err(e) = result {
            if !e.is_rejection() {
                tracing::warn!("{} failed: {}", operation, e);
            }
        }
        self.outcomes.with_label_values(&[operation, outcome]).inc();
    }

    pub fn count(&self, operation: &str, outcome: &str) -> u64 {
        self.outcomes.with_label_values(&[operation, outcome]).get()
    }

    /// Text exposition format.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
