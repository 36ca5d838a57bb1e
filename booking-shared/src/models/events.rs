use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const TOPIC_RESERVED: &str = "reservation.reserved";
pub const TOPIC_CONFIRMED: &str = "reservation.confirmed";
pub const TOPIC_CANCELLED: &str = "reservation.cancelled";
pub const TOPIC_EXPIRED: &str = "reservation.expired";
pub const TOPIC_RELEASE_DRIFT: &str = "reservation.release_drift";
pub const TOPIC_RELEASE_RECOVERED: &str = "reservation.release_recovered";

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct ReservationPlacedEvent {
    pub reservation_id: Uuid,
    pub user_id: i64,
    pub ticket_id: i64,
    pub quantity: i32,
    pub total_amount: BigDecimal,
    pub expires_at: DateTime<Utc>,
    pub timestamp: i64,
}

/// Shared shape for confirm, cancel and expire transitions.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct ReservationTransitionEvent {
    pub reservation_id: Uuid,
    pub user_id: i64,
    pub ticket_id: i64,
    pub quantity: i32,
    pub from_status: String,
    pub to_status: String,
    pub timestamp: i64,
}

/// The remote inventory keeper may still count a hold that the ledger has closed.
/// Consumers of this event reconcile the ticket's available count out-of-band.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct ReleaseDriftEvent {
    pub reservation_id: Uuid,
    pub ticket_id: i64,
    pub quantity: i32,
    pub reason: String,
    pub detected_at: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct ReleaseRecoveredEvent {
    pub reservation_id: Uuid,
    pub ticket_id: i64,
    pub quantity: i32,
    pub attempts: u32,
    pub recovered_at: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationEvent {
    Reserved(ReservationPlacedEvent),
    Confirmed(ReservationTransitionEvent),
    Cancelled(ReservationTransitionEvent),
    Expired(ReservationTransitionEvent),
    ReleaseDrift(ReleaseDriftEvent),
    ReleaseRecovered(ReleaseRecoveredEvent),
}

impl ReservationEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            ReservationEvent::Reserved(_) => TOPIC_RESERVED,
            ReservationEvent::Confirmed(_) => TOPIC_CONFIRMED,
            ReservationEvent::Cancelled(_) => TOPIC_CANCELLED,
            ReservationEvent::Expired(_) => TOPIC_EXPIRED,
            ReservationEvent::ReleaseDrift(_) => TOPIC_RELEASE_DRIFT,
            ReservationEvent::ReleaseRecovered(_) => TOPIC_RELEASE_RECOVERED,
        }
    }

    /// Partition key: every event of one reservation lands on the same partition.
    pub fn reservation_id(&self) -> Uuid {
        match self {
            ReservationEvent::Reserved(e) => e.reservation_id,
            ReservationEvent::Confirmed(e)
            | ReservationEvent::Cancelled(e)
            | ReservationEvent::Expired(e) => e.reservation_id,
            ReservationEvent::ReleaseDrift(e) => e.reservation_id,
            ReservationEvent::ReleaseRecovered(e) => e.reservation_id,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ReservationEvent::Reserved(_) => "reserved",
            ReservationEvent::Confirmed(_) => "confirmed",
            ReservationEvent::Cancelled(_) => "cancelled",
            ReservationEvent::Expired(_) => "expired",
            ReservationEvent::ReleaseDrift(_) => "release_drift",
            ReservationEvent::ReleaseRecovered(_) => "release_recovered",
        }
    }
}
