use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::reservation::{Reservation, ReservationStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A RESERVED row already exists for the same (user, ticket).
    #[error("{0}")]
    Duplicate(String),
    /// Inserting would push the ticket's active quantity past the limit.
    #[error("{0}")]
    CapacityExceeded(String),
    #[error("ledger store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Target of a compare-and-swap status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub to: ReservationStatus,
    pub at: DateTime<Utc>,
}

/// Durable storage of reservation records.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Conditional insert. Refuses with `Duplicate` when the user already holds a
    /// RESERVED row for the ticket, and with `CapacityExceeded` when the ticket's
    /// active quantity plus this one would exceed `capacity_limit`.
    async fn insert(&self, reservation: &Reservation, capacity_limit: i64) -> StoreResult<()>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Reservation>>;

    /// Newest booking first.
    async fn find_by_user(&self, user_id: i64) -> StoreResult<Vec<Reservation>>;

    async fn find_by_status(&self, status: ReservationStatus) -> StoreResult<Vec<Reservation>>;

    /// RESERVED rows whose expiry date is strictly before `now`.
    async fn find_expired_before(&self, now: DateTime<Utc>) -> StoreResult<Vec<Reservation>>;

    async fn count_active(&self, ticket_id: i64) -> StoreResult<i64>;

    /// Sum of quantity over RESERVED and CONFIRMED rows; 0 when there are none.
    async fn sum_active_quantity(&self, ticket_id: i64) -> StoreResult<i64>;

    async fn exists_reserved(&self, user_id: i64, ticket_id: i64) -> StoreResult<bool>;

    /// Write `change` only if the row is still in `expected`. Returns the updated row,
    /// or `None` when the row is missing or another writer moved it first.
    async fn transition(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        change: StatusChange,
    ) -> StoreResult<Option<Reservation>>;
}
