use async_trait::async_trait;
use booking_shared::ReservationEvent;

#[derive(Debug, thiserror::Error)]
#[error("failed to publish {topic}: {message}")]
pub struct PublishError {
    pub topic: String,
    pub message: String,
}

/// Outbound channel for lifecycle and drift events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &ReservationEvent) -> Result<(), PublishError>;
}

/// Publisher that only logs; used when no broker is configured.
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &ReservationEvent) -> Result<(), PublishError> {
        tracing::debug!(
            topic = event.topic(),
            reservation_id = %event.reservation_id(),
            "event published"
        );
        Ok(())
    }
}
