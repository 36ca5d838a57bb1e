use async_trait::async_trait;
use booking_core::repository::StoreResult;
use booking_core::{LedgerStore, Reservation, ReservationStatus, StatusChange, StoreError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Serialized in-process ledger store. Every operation runs under one mutex
/// acquisition, so the conditional insert and the status CAS are atomic.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    reservations: Mutex<HashMap<Uuid, Reservation>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Overwrite a row as-is. Lets tests seed states the public API cannot reach directly.
    pub fn put(&self, reservation: Reservation) {
        self.lock().insert(reservation.id, reservation);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Reservation>> {
        self.reservations.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn active_quantity(rows: &HashMap<Uuid, Reservation>, ticket_id: i64) -> i64 {
        rows.values()
            .filter(|r| r.ticket_id == ticket_id && r.status.is_active())
            .map(|r| i64::from(r.quantity))
            .sum()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert(&self, reservation: &Reservation, capacity_limit: i64) -> StoreResult<()> {
        let mut rows = self.lock();

        if rows.contains_key(&reservation.id) {
            return Err(StoreError::Duplicate(format!(
                "reservation {} already stored",
                reservation.id
            )));
        }

        let duplicate = rows.values().any(|r| {
            r.user_id == reservation.user_id
                && r.ticket_id == reservation.ticket_id
                && r.status == ReservationStatus::Reserved
        });
        if duplicate {
            return Err(StoreError::Duplicate(format!(
                "user {} already holds ticket {}",
                reservation.user_id, reservation.ticket_id
            )));
        }

        let active = Self::active_quantity(&rows, reservation.ticket_id);
        if active + i64::from(reservation.quantity) > capacity_limit {
            return Err(StoreError::CapacityExceeded(format!(
                "ticket {} has {} of {} held",
                reservation.ticket_id, active, capacity_limit
            )));
        }

        rows.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Reservation>> {
        Ok(self.lock().get(&id).cloned())
    }

    async fn find_by_user(&self, user_id: i64) -> StoreResult<Vec<Reservation>> {
        let mut found: Vec<Reservation> = self.lock()
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.booking_date.cmp(&a.booking_date));
        Ok(found)
    }

    async fn find_by_status(&self, status: ReservationStatus) -> StoreResult<Vec<Reservation>> {
        let mut found: Vec<Reservation> = self.lock()
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.booking_date.cmp(&b.booking_date));
        Ok(found)
    }

    async fn find_expired_before(&self, now: DateTime<Utc>) -> StoreResult<Vec<Reservation>> {
        let mut found: Vec<Reservation> = self.lock()
            .values()
            .filter(|r| r.status == ReservationStatus::Reserved && r.expiry_date < now)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.expiry_date.cmp(&b.expiry_date));
        Ok(found)
    }

    async fn count_active(&self, ticket_id: i64) -> StoreResult<i64> {
        let count = self.lock()
            .values()
            .filter(|r| r.ticket_id == ticket_id && r.status.is_active())
            .count();
        Ok(count as i64)
    }

    async fn sum_active_quantity(&self, ticket_id: i64) -> StoreResult<i64> {
        Ok(Self::active_quantity(&self.lock(), ticket_id))
    }

    async fn exists_reserved(&self, user_id: i64, ticket_id: i64) -> StoreResult<bool> {
        Ok(self.lock().values().any(|r| {
            r.user_id == user_id
                && r.ticket_id == ticket_id
                && r.status == ReservationStatus::Reserved
        }))
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        change: StatusChange,
    ) -> StoreResult<Option<Reservation>> {
        let mut rows = self.lock();
        match rows.get_mut(&id) {
            Some(row) if row.status == expected => {
                row.apply(&change);
                Ok(Some(row.clone()))
            }
            _ => Ok(None),
        }
    }
}
