use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::UpstreamError;

/// What the ticket service tells us about an item at lookup time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketInfo {
    pub id: i64,
    pub event_name: String,
    pub venue: String,
    pub price: BigDecimal,
}

/// Remote keeper of the authoritative available count per ticket.
#[async_trait]
pub trait InventoryKeeper: Send + Sync {
    /// `Ok(None)` when the ticket does not exist.
    async fn get_ticket(&self, ticket_id: i64) -> Result<Option<TicketInfo>, UpstreamError>;

    async fn reserve(&self, ticket_id: i64, quantity: i32) -> Result<(), UpstreamError>;

    async fn release(&self, ticket_id: i64, quantity: i32) -> Result<(), UpstreamError>;
}
