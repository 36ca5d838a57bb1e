use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Reservation status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Reserved,
    Confirmed,
    Cancelled,
    Expired,
}

impl ReservationStatus {
    pub const ALL: [ReservationStatus; 4] = [
        ReservationStatus::Reserved,
        ReservationStatus::Confirmed,
        ReservationStatus::Cancelled,
        ReservationStatus::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Reserved => "RESERVED",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Cancelled => "CANCELLED",
            ReservationStatus::Expired => "EXPIRED",
        }
    }

    /// Counts against the item's capacity.
    pub fn is_active(&self) -> bool {
        matches!(self, ReservationStatus::Reserved | ReservationStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationStatus::Cancelled | ReservationStatus::Expired)
    }

    /// RESERVED -> CONFIRMED | CANCELLED | EXPIRED, CONFIRMED -> CANCELLED.
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (Reserved, Confirmed)
                | (Reserved, Cancelled)
                | (Reserved, Expired)
                | (Confirmed, Cancelled)
        )
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown reservation status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for ReservationStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReservationStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

/// A time-boxed claim on ticket inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reservation {
    pub id: Uuid,
    pub user_id: i64,
    pub ticket_id: i64,
    pub quantity: i32,
    /// Price snapshot taken from the inventory keeper when the hold was placed.
    pub unit_price: BigDecimal,
    pub total_amount: BigDecimal,
    pub status: ReservationStatus,
    pub booking_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub confirmed_date: Option<DateTime<Utc>>,
    pub cancelled_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new(
        user_id: i64,
        ticket_id: i64,
        quantity: i32,
        unit_price: BigDecimal,
        now: DateTime<Utc>,
        hold_window: Duration,
    ) -> Self {
        let total_amount = &unit_price * BigDecimal::from(quantity);
        Self {
            id: Uuid::new_v4(),
            user_id,
            ticket_id,
            quantity,
            unit_price,
            total_amount,
            status: ReservationStatus::Reserved,
            booking_date: now,
            expiry_date: now + hold_window,
            confirmed_date: None,
            cancelled_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The hold window has elapsed at `now`.
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_date
    }

    /// Write a status change onto the record. Callers check legality first.
    pub fn apply(&mut self, change: &crate::StatusChange) {
        self.status = change.to;
        match change.to {
            ReservationStatus::Confirmed => self.confirmed_date = Some(change.at),
            ReservationStatus::Cancelled => self.cancelled_date = Some(change.at),
            _ => {}
        }
        self.updated_at = change.at;
    }
}
