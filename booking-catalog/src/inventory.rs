use async_trait::async_trait;
use bigdecimal::BigDecimal;
use booking_core::{InventoryKeeper, TicketInfo, UpstreamError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const SERVICE: &str = "ticket-service";

/// Stock record for one ticket type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryItem {
    pub ticket: TicketInfo,
    pub available_quantity: i32,
    pub total_capacity: i32,
    pub reserved_quantity: i32,
}

#[derive(Debug, Default)]
struct Faults {
    reserve: Option<String>,
    release: Option<String>,
    latency: Option<Duration>,
}

/// In-process ticket keeper. Stands in for the remote ticket service in local runs
/// and tests; faults and latency can be injected to exercise the saga paths.
#[derive(Debug, Default)]
pub struct InMemoryInventory {
    inventory: Mutex<HashMap<i64, InventoryItem>>,
    faults: Mutex<Faults>,
    reserve_calls: AtomicUsize,
    release_calls: AtomicUsize,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize stock for a ticket
    pub fn initialize(&self, ticket: TicketInfo, total_capacity: i32) {
        let mut inventory = self.lock_inventory();
        inventory.insert(ticket.id, InventoryItem {
            ticket,
            available_quantity: total_capacity,
            total_capacity,
            reserved_quantity: 0,
        });
    }

    /// Convenience for a ticket with placeholder event details.
    pub fn with_ticket(self, ticket_id: i64, price: BigDecimal, total_capacity: i32) -> Self {
        self.initialize(
            TicketInfo {
                id: ticket_id,
                event_name: format!("Event {}", ticket_id),
                venue: "Main Hall".to_string(),
                price,
            },
            total_capacity,
        );
        self
    }

    pub fn get(&self, ticket_id: i64) -> Option<InventoryItem> {
        self.lock_inventory().get(&ticket_id).cloned()
    }

    pub fn fail_reserves(&self, reason: Option<&str>) {
        self.lock_faults().reserve = reason.map(str::to_string);
    }

    pub fn fail_releases(&self, reason: Option<&str>) {
        self.lock_faults().release = reason.map(str::to_string);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock_faults().latency = latency;
    }

    pub fn reserve_calls(&self) -> usize {
        self.reserve_calls.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }

    /// Move stock from available to reserved.
    pub fn reserve_now(&self, ticket_id: i64, quantity: i32) -> Result<(), InventoryError> {
        let mut inventory = self.lock_inventory();
        let item = inventory.get_mut(&ticket_id).ok_or(InventoryError::NotFound(ticket_id))?;

        if item.available_quantity < quantity {
            return Err(InventoryError::InsufficientInventory {
                requested: quantity,
                available: item.available_quantity,
            });
        }

        item.available_quantity -= quantity;
        item.reserved_quantity += quantity;
        Ok(())
    }

    /// Return reserved stock to available.
    pub fn release_now(&self, ticket_id: i64, quantity: i32) -> Result<(), InventoryError> {
        let mut inventory = self.lock_inventory();
        let item = inventory.get_mut(&ticket_id).ok_or(InventoryError::NotFound(ticket_id))?;

        item.available_quantity = (item.available_quantity + quantity).min(item.total_capacity);
        item.reserved_quantity = item.reserved_quantity.saturating_sub(quantity).max(0);
        Ok(())
    }

    async fn simulate_latency(&self) {
        let latency = self.lock_faults().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn lock_inventory(&self) -> std::sync::MutexGuard<'_, HashMap<i64, InventoryItem>> {
        self.inventory.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl InventoryKeeper for InMemoryInventory {
    async fn get_ticket(&self, ticket_id: i64) -> Result<Option<TicketInfo>, UpstreamError> {
        self.simulate_latency().await;
        Ok(self.get(ticket_id).map(|item| item.ticket))
    }

    async fn reserve(&self, ticket_id: i64, quantity: i32) -> Result<(), UpstreamError> {
        self.reserve_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        let fault = self.lock_faults().reserve.clone();
        if let Some(message) = fault {
            return Err(UpstreamError::Unavailable { service: SERVICE, message });
        }
        self.reserve_now(ticket_id, quantity).map_err(|e| e.into_upstream())
    }

    async fn release(&self, ticket_id: i64, quantity: i32) -> Result<(), UpstreamError> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        let fault = self.lock_faults().release.clone();
        if let Some(message) = fault {
            return Err(UpstreamError::Unavailable { service: SERVICE, message });
        }
        self.release_now(ticket_id, quantity).map_err(|e| e.into_upstream())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Ticket not found: {0}")]
    NotFound(i64),

    #[error("Insufficient inventory: requested {requested}, available {available}")]
    InsufficientInventory {
        requested: i32,
        available: i32,
    },
}

impl InventoryError {
    fn into_upstream(self) -> UpstreamError {
        let status = match self {
            InventoryError::NotFound(_) => 404,
            InventoryError::InsufficientInventory { .. } => 409,
        };
        UpstreamError::Rejected { service: SERVICE, status, message: self.to_string() }
    }
}
