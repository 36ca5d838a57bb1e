//! Prometheus counters for reservation lifecycle and release drift.

use async_trait::async_trait;
use axum::{extract::State, http::{header, StatusCode}, response::IntoResponse};
use booking_core::{EventPublisher, PublishError};
use booking_shared::ReservationEvent;
use prometheus::{opts, IntCounterVec, Registry, TextEncoder};
use std::sync::Arc;

use crate::state::AppState;

pub struct Metrics {
    registry: Registry,
    /// Labels: `kind` (reserved, confirmed, cancelled, expired, release_drift, release_recovered)
    events: IntCounterVec,
    /// Labels: `topic`
    publish_failures: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let events = IntCounterVec::new(
            opts!("booking_reservation_events_total", "Reservation lifecycle and drift events"),
            &["kind"],
        )?;
        let publish_failures = IntCounterVec::new(
            opts!("booking_event_publish_failures_total", "Events the publisher failed to deliver"),
            &["topic"],
        )?;

        registry.register(Box::new(events.clone()))?;
        registry.register(Box::new(publish_failures.clone()))?;

        Ok(Self { registry, events, publish_failures })
    }

    pub fn record_event(&self, kind: &str) {
        self.events.with_label_values(&[kind]).inc();
    }

    pub fn event_count(&self, kind: &str) -> u64 {
        self.events.with_label_values(&[kind]).get()
    }

    pub fn export(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

/// Counts every event before handing it to the real publisher.
pub struct MetricsPublisher {
    inner: Arc<dyn EventPublisher>,
    metrics: Arc<Metrics>,
}

impl MetricsPublisher {
    pub fn new(inner: Arc<dyn EventPublisher>, metrics: Arc<Metrics>) -> Self {
        Self { inner, metrics }
    }
}

#[async_trait]
impl EventPublisher for MetricsPublisher {
    async fn publish(&self, event: &ReservationEvent) -> Result<(), PublishError> {
        self.metrics.record_event(event.kind());
        let result = self.inner.publish(event).await;
        if result.is_err() {
            self.metrics.publish_failures.with_label_values(&[event.topic()]).inc();
        }
        result
    }
}

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.export() {
        Ok(body) => {
            let content_type = [(header::CONTENT_TYPE, "text/plain; version=0.0.4")];
            (StatusCode::OK, content_type, body).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
