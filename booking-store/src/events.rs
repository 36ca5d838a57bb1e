use async_trait::async_trait;
use booking_core::{EventPublisher, PublishError};
use booking_shared::ReservationEvent;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{debug, error};

/// Kafka producer for reservation lifecycle and drift events. Records are keyed
/// by reservation id so one reservation's events stay ordered.
#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: &str,
    ) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                debug!(
                    topic,
                    key,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    "event delivered"
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!(topic, key, error = %e, "failed to deliver event");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl EventPublisher for EventProducer {
    async fn publish(&self, event: &ReservationEvent) -> Result<(), PublishError> {
        let topic = event.topic();
        let payload = serde_json::to_string(event).map_err(|e| PublishError {
            topic: topic.to_string(),
            message: e.to_string(),
        })?;

        self.send(topic, &event.reservation_id().to_string(), &payload)
            .await
            .map_err(|e| PublishError { topic: topic.to_string(), message: e.to_string() })
    }
}
