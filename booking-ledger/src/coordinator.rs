//! Two-step protocol against the remote inventory keeper.
//!
//! The ledger and the keeper never share a transaction. A remote reserve must
//! succeed before the ledger commits a hold, and a remote release happens only
//! after the ledger has committed the closing transition. Releases are
//! best-effort: a failure is reported as release drift and, if configured,
//! retried in the background, but never undoes the local transition.

use backon::{ExponentialBuilder, Retryable};
use booking_core::events::EventPublisher;
use booking_core::{InventoryKeeper, Reservation, RetryPolicy, TicketInfo, UpstreamError};
use booking_shared::models::events::{ReleaseDriftEvent, ReleaseRecoveredEvent};
use booking_shared::ReservationEvent;
use chrono::Utc;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const TICKET_SERVICE: &str = "ticket-service";

/// Run a remote call under a deadline; elapsing counts as an upstream timeout.
pub async fn bounded<T, F>(
    service: &'static str,
    limit: Duration,
    call: F,
) -> Result<T, UpstreamError>
where
    F: Future<Output = Result<T, UpstreamError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(UpstreamError::Timeout { service, after_ms: limit.as_millis() as u64 }),
    }
}

/// A release the keeper did not acknowledge.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseDrift {
    pub reservation_id: Uuid,
    pub ticket_id: i64,
    pub quantity: i32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReleaseOutcome {
    Released,
    Drifted(ReleaseDrift),
}

pub struct InventoryCoordinator {
    keeper: Arc<dyn InventoryKeeper>,
    publisher: Arc<dyn EventPublisher>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl InventoryCoordinator {
    pub fn new(
        keeper: Arc<dyn InventoryKeeper>,
        publisher: Arc<dyn EventPublisher>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self { keeper, publisher, timeout, retry }
    }

    pub async fn lookup(&self, ticket_id: i64) -> Result<Option<TicketInfo>, UpstreamError> {
        bounded(TICKET_SERVICE, self.timeout, self.keeper.get_ticket(ticket_id)).await
    }

    /// Claim stock on the keeper. Any failure aborts the caller's operation.
    pub async fn reserve(&self, ticket_id: i64, quantity: i32) -> Result<(), UpstreamError> {
        let call = self.keeper.reserve(ticket_id, quantity);
        match bounded(TICKET_SERVICE, self.timeout, call).await {
            Ok(()) => {
                debug!(ticket_id, quantity, "remote reserve acknowledged");
                Ok(())
            }
            Err(e) => {
                warn!(ticket_id, quantity, error = %e, "remote reserve failed");
                Err(e)
            }
        }
    }

    /// Return a reservation's stock to the keeper. Never fails: a refused or
    /// timed-out release is logged, published as drift, and retried if enabled.
    pub async fn release(&self, reservation: &Reservation) -> ReleaseOutcome {
        let ticket_id = reservation.ticket_id;
        let quantity = reservation.quantity;

        let call = self.keeper.release(ticket_id, quantity);
        match bounded(TICKET_SERVICE, self.timeout, call).await {
            Ok(()) => {
                debug!(
                    reservation_id = %reservation.id,
                    ticket_id,
                    quantity,
                    "remote release acknowledged"
                );
                ReleaseOutcome::Released
            }
            Err(e) => {
                let drift = ReleaseDrift {
                    reservation_id: reservation.id,
                    ticket_id,
                    quantity,
                    reason: e.to_string(),
                };
                self.report_drift(&drift).await;
                if self.retry.max_attempts > 0 {
                    self.spawn_retry(drift.clone());
                }
                ReleaseOutcome::Drifted(drift)
            }
        }
    }

    async fn report_drift(&self, drift: &ReleaseDrift) {
        error!(
            reservation_id = %drift.reservation_id,
            ticket_id = drift.ticket_id,
            quantity = drift.quantity,
            reason = %drift.reason,
            "release drift: keeper still counts a closed hold, reconcile required"
        );

        let event = ReservationEvent::ReleaseDrift(ReleaseDriftEvent {
            reservation_id: drift.reservation_id,
            ticket_id: drift.ticket_id,
            quantity: drift.quantity,
            reason: drift.reason.clone(),
            detected_at: Utc::now().timestamp(),
        });
        if let Err(e) = self.publisher.publish(&event).await {
            error!(
                reservation_id = %drift.reservation_id,
                error = %e,
                "failed to publish release drift"
            );
        }
    }

    fn spawn_retry(&self, drift: ReleaseDrift) {
        let keeper = self.keeper.clone();
        let publisher = self.publisher.clone();
        let timeout = self.timeout;
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.retry.initial_backoff)
            .with_max_delay(self.retry.max_backoff)
            .with_max_times(self.retry.max_attempts as usize);

        tokio::spawn(async move {
            let attempts = Arc::new(AtomicU32::new(0));
            let ticket_id = drift.ticket_id;
            let quantity = drift.quantity;

            let op = {
                let attempts = attempts.clone();
                move || {
                    let keeper = keeper.clone();
                    let attempts = attempts.clone();
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        bounded(TICKET_SERVICE, timeout, keeper.release(ticket_id, quantity)).await
                    }
                }
            };

            let result = op
                .retry(backoff)
                .sleep(tokio::time::sleep)
                .notify(|err: &UpstreamError, dur: Duration| {
                    debug!(
                        reservation_id = %drift.reservation_id,
                        backoff_ms = dur.as_millis() as u64,
                        error = %err,
                        "retrying inventory release"
                    );
                })
                .await;

            let attempts = attempts.load(Ordering::SeqCst);
            match result {
                Ok(()) => {
                    info!(
                        reservation_id = %drift.reservation_id,
                        attempts,
                        "release drift recovered"
                    );
                    let event = ReservationEvent::ReleaseRecovered(ReleaseRecoveredEvent {
                        reservation_id: drift.reservation_id,
                        ticket_id,
                        quantity,
                        attempts,
                        recovered_at: Utc::now().timestamp(),
                    });
                    if let Err(e) = publisher.publish(&event).await {
                        warn!(
                            reservation_id = %drift.reservation_id,
                            error = %e,
                            "failed to publish release recovery"
                        );
                    }
                }
                Err(e) => {
                    error!(
                        reservation_id = %drift.reservation_id,
                        ticket_id,
                        quantity,
                        attempts,
                        error = %e,
                        "release retries exhausted, drift left for reconciliation"
                    );
                }
            }
        });
    }
}
