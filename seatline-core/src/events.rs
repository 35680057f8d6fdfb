use async_trait::async_trait;
use seatline_shared::ReservationEvent;
use tokio::sync::Mutex;

/// Destination of domain events (a broker topic, the log, a test recorder).
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(
        &self,
        event: &ReservationEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Writes events to the log only.
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn publish(
        &self,
        event: &ReservationEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let payload = serde_json::to_string(event)?;
        tracing::info!(topic = event.topic(), key = %event.key(), "{}", payload);
        Ok(())
    }
}

/// Keeps every published event in memory.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<ReservationEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<ReservationEvent> {
        self.events.lock().await.clone()
    }

    pub async fn topics(&self) -> Vec<&'static str> {
        self.events.lock().await.iter().map(|e| e.topic()).collect()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn publish(
        &self,
        event: &ReservationEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seatline_shared::{Claim, Reservation, ReservationStatus};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_recording_sink_keeps_order() {
        let sink = RecordingEventSink::new();
        let reservation = Reservation::new(
            Uuid::new_v4(),
            "A1".to_string(),
            Claim::new(Uuid::new_v4()),
            ReservationStatus::Confirmed,
        );

        sink.publish(&ReservationEvent::confirmed(&reservation)).await.unwrap();
        sink.publish(&ReservationEvent::canceled(&reservation)).await.unwrap();

        assert_eq!(
            sink.topics().await,
            vec!["reservation.confirmed", "reservation.canceled"]
        );
    }

    #[tokio::test]
    async fn test_tracing_sink_accepts_events() {
        let reservation = Reservation::new(
            Uuid::new_v4(),
            "B2".to_string(),
            Claim::new(Uuid::new_v4()),
            ReservationStatus::Pending,
        );
        assert!(TracingEventSink
            .publish(&ReservationEvent::canceled(&reservation))
            .await
            .is_ok());
    }
}
