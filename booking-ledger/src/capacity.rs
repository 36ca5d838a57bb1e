use booking_core::{CoreResult, LedgerStore};
use std::sync::Arc;

/// Decides whether a requested quantity still fits under the per-ticket limit.
///
/// The check reads the store and returns; it is not atomic with the insert that
/// follows it. The store's conditional insert is what finally enforces the limit.
#[derive(Clone)]
pub struct CapacityGuard {
    store: Arc<dyn LedgerStore>,
    capacity_limit: i64,
}

impl CapacityGuard {
    pub fn new(store: Arc<dyn LedgerStore>, capacity_limit: i64) -> Self {
        Self { store, capacity_limit }
    }

    pub fn capacity_limit(&self) -> i64 {
        self.capacity_limit
    }

    pub async fn fits(&self, ticket_id: i64, requested: i32) -> CoreResult<bool> {
        let active = self.store.sum_active_quantity(ticket_id).await?;
        Ok(active + i64::from(requested) <= self.capacity_limit)
    }

    pub async fn remaining(&self, ticket_id: i64) -> CoreResult<i64> {
        let active = self.store.sum_active_quantity(ticket_id).await?;
        Ok((self.capacity_limit - active).max(0))
    }
}
