#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use booking_catalog::{InMemoryInventory, InMemoryUserDirectory};
use booking_core::{
    Clock, EventPublisher, LocalSweepLease, ManualClock, PublishError, ReservationPolicy,
    RetryPolicy,
};
use booking_ledger::{ExpiryReaper, InMemoryLedgerStore, InventoryCoordinator, ReservationLedger};
use booking_shared::ReservationEvent;
use chrono::{DateTime, TimeZone, Utc};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TICKET: i64 = 5;

/// Captures every published event for assertions.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<ReservationEvent>>,
}

impl RecordingPublisher {
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.kind()).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &ReservationEvent) -> Result<(), PublishError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub struct Harness {
    pub ledger: Arc<ReservationLedger>,
    pub reaper: Arc<ExpiryReaper>,
    pub store: Arc<InMemoryLedgerStore>,
    pub keeper: Arc<InMemoryInventory>,
    pub users: Arc<InMemoryUserDirectory>,
    pub clock: Arc<ManualClock>,
    pub events: Arc<RecordingPublisher>,
}

impl Harness {
    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

pub fn harness() -> Harness {
    let policy = ReservationPolicy {
        remote_timeout: Duration::from_millis(200),
        release_retry: RetryPolicy::disabled(),
        ..ReservationPolicy::default()
    };
    harness_with(policy, 10_000)
}

pub fn harness_with(policy: ReservationPolicy, stock: i32) -> Harness {
    let store = Arc::new(InMemoryLedgerStore::new());
    let keeper = Arc::new(
        InMemoryInventory::new().with_ticket(TICKET, BigDecimal::from_str("50.00").unwrap(), stock),
    );
    let users = Arc::new(InMemoryUserDirectory::new(1..=20));
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()));
    let events = Arc::new(RecordingPublisher::default());

    let coordinator = Arc::new(InventoryCoordinator::new(
        keeper.clone(),
        events.clone(),
        policy.remote_timeout,
        policy.release_retry.clone(),
    ));
    let ledger = Arc::new(ReservationLedger::new(
        store.clone(),
        users.clone(),
        coordinator,
        events.clone(),
        clock.clone(),
        policy,
    ));
    let reaper = Arc::new(ExpiryReaper::new(ledger.clone(), Arc::new(LocalSweepLease::new())));

    Harness { ledger, reaper, store, keeper, users, clock, events }
}
