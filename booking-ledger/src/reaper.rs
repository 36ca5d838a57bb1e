use booking_core::{Caller, CoreError, CoreResult, SweepLease};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::ledger::ReservationLedger;

#[derive(Debug, Clone)]
pub struct SweepFailure {
    pub reservation_id: Uuid,
    pub error: String,
}

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub scanned: usize,
    pub expired: usize,
    /// Holds another caller moved between the scan and the transition.
    pub skipped: usize,
    pub failures: Vec<SweepFailure>,
    /// Another sweep held the lease; nothing was scanned.
    pub overlapped: bool,
}

/// Drives lapsed RESERVED holds through the expire transition.
pub struct ExpiryReaper {
    ledger: Arc<ReservationLedger>,
    lease: Arc<dyn SweepLease>,
}

impl ExpiryReaper {
    pub fn new(ledger: Arc<ReservationLedger>, lease: Arc<dyn SweepLease>) -> Self {
        Self { ledger, lease }
    }

    /// One pass over holds that lapsed before `now`. Single-flight: an overlapping
    /// call returns at once with `overlapped` set.
    ///
    /// The pass runs on its own task and always gives the lease back, even when
    /// the caller stops waiting for the report.
    pub async fn sweep(&self, now: DateTime<Utc>) -> CoreResult<SweepReport> {
        let pass = tokio::spawn(single_flight(self.ledger.clone(), self.lease.clone(), now));
        pass.await
            .map_err(|e| CoreError::StorageError(format!("expiry sweep task failed: {}", e)))?
    }

    /// Admin-triggered sweep at the ledger's current time. Returns how many holds expired.
    pub async fn sweep_expired(&self, caller: &Caller) -> CoreResult<usize> {
        caller.ensure_privileged("processing expired reservations")?;
        let report = self.sweep(self.ledger.now()).await?;
        Ok(report.expired)
    }

    /// Scheduled sweep loop. Stops when `shutdown` fires or its sender is dropped.
    pub async fn run(self: Arc<Self>, every: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval_secs = every.as_secs(), "expiry reaper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep(self.ledger.now()).await {
                        error!(error = %e, "expiry sweep failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!("expiry reaper stopping");
                    break;
                }
            }
        }
    }
}

async fn single_flight(
    ledger: Arc<ReservationLedger>,
    lease: Arc<dyn SweepLease>,
    now: DateTime<Utc>,
) -> CoreResult<SweepReport> {
    if !lease.try_acquire().await? {
        debug!("expiry sweep already running, skipping");
        return Ok(SweepReport { overlapped: true, ..Default::default() });
    }

    let result = sweep_locked(&ledger, now).await;

    if let Err(e) = lease.release().await {
        warn!(error = %e, "failed to release sweep lease");
    }
    result
}

async fn sweep_locked(ledger: &ReservationLedger, now: DateTime<Utc>) -> CoreResult<SweepReport> {
    let lapsed = ledger.find_lapsed(now).await?;
    let mut report = SweepReport { scanned: lapsed.len(), ..Default::default() };

    for reservation in &lapsed {
        match ledger.expire_at(reservation, now).await {
            Ok(_) => report.expired += 1,
            Err(CoreError::StateError(reason)) => {
                debug!(
                    reservation_id = %reservation.id,
                    %reason,
                    "hold moved before sweep reached it"
                );
                report.skipped += 1;
            }
            Err(e) => {
                error!(
                    reservation_id = %reservation.id,
                    error = %e,
                    "failed to expire reservation"
                );
                report.failures.push(SweepFailure {
                    reservation_id: reservation.id,
                    error: e.to_string(),
                });
            }
        }
    }

    if report.scanned > 0 {
        info!(
            scanned = report.scanned,
            expired = report.expired,
            skipped = report.skipped,
            failed = report.failures.len(),
            "expiry sweep finished"
        );
    }
    Ok(report)
}
