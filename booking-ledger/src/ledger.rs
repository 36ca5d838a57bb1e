use booking_core::events::EventPublisher;
use booking_core::{
    Caller, Clock, CoreError, CoreResult, LedgerStore, Reservation, ReservationPolicy,
    ReservationStatus, StatusChange, UserDirectory,
};
use booking_shared::models::events::{ReservationPlacedEvent, ReservationTransitionEvent};
use booking_shared::ReservationEvent;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::capacity::CapacityGuard;
use crate::coordinator::{bounded, InventoryCoordinator};

const AUTH_SERVICE: &str = "auth-service";

/// Capacity snapshot for one ticket.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TicketAvailability {
    pub ticket_id: i64,
    pub active_reservations: i64,
    pub active_quantity: i64,
    pub capacity_limit: i64,
    pub remaining: i64,
}

/// Owns the reservation lifecycle: RESERVED -> CONFIRMED | CANCELLED | EXPIRED,
/// CONFIRMED -> CANCELLED.
///
/// Every status write goes through the store's compare-and-swap, so concurrent
/// callers (including the expiry sweep) cannot both win the same transition.
pub struct ReservationLedger {
    store: Arc<dyn LedgerStore>,
    users: Arc<dyn UserDirectory>,
    coordinator: Arc<InventoryCoordinator>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    capacity: CapacityGuard,
    policy: ReservationPolicy,
}

impl ReservationLedger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        users: Arc<dyn UserDirectory>,
        coordinator: Arc<InventoryCoordinator>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        policy: ReservationPolicy,
    ) -> Self {
        let capacity = CapacityGuard::new(store.clone(), policy.capacity_limit);
        Self { store, users, coordinator, publisher, clock, capacity, policy }
    }

    pub fn policy(&self) -> &ReservationPolicy {
        &self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Place a hold. The remote reserve happens before the row is written; if the
    /// store then refuses the row, the remote hold is released again.
    pub async fn reserve(
        &self,
        caller: &Caller,
        user_id: i64,
        ticket_id: i64,
        quantity: i32,
    ) -> CoreResult<Reservation> {
        caller.ensure_can_act_for(user_id)?;
        if quantity < 1 {
            return Err(CoreError::ValidationError(format!(
                "quantity must be at least 1, got {}",
                quantity
            )));
        }

        let lookup = self.users.exists(user_id);
        if !bounded(AUTH_SERVICE, self.policy.remote_timeout, lookup).await? {
            return Err(CoreError::ValidationError(format!("user {} does not exist", user_id)));
        }

        let ticket = self.coordinator.lookup(ticket_id).await?.ok_or_else(|| {
            CoreError::ValidationError(format!("ticket {} does not exist", ticket_id))
        })?;

        if self.store.exists_reserved(user_id, ticket_id).await? {
            return Err(CoreError::ConflictError(format!(
                "user {} already holds ticket {}",
                user_id, ticket_id
            )));
        }

        if !self.capacity.fits(ticket_id, quantity).await? {
            return Err(CoreError::ConflictError(format!(
                "ticket {} cannot take {} more (limit {})",
                ticket_id,
                quantity,
                self.capacity.capacity_limit()
            )));
        }

        self.coordinator.reserve(ticket_id, quantity).await?;

        let reservation = Reservation::new(
            user_id,
            ticket_id,
            quantity,
            ticket.price,
            self.clock.now(),
            self.policy.hold_window,
        );

        if let Err(e) = self.store.insert(&reservation, self.capacity.capacity_limit()).await {
            warn!(
                reservation_id = %reservation.id,
                user_id,
                ticket_id,
                quantity,
                error = %e,
                "store refused hold after remote reserve, compensating"
            );
            self.settle(reservation, None).await;
            return Err(e.into());
        }

        info!(
            reservation_id = %reservation.id,
            user_id,
            ticket_id,
            quantity,
            total_amount = %reservation.total_amount,
            expires_at = %reservation.expiry_date,
            "reservation placed"
        );

        self.publish(ReservationEvent::Reserved(ReservationPlacedEvent {
            reservation_id: reservation.id,
            user_id,
            ticket_id,
            quantity,
            total_amount: reservation.total_amount.clone(),
            expires_at: reservation.expiry_date,
            timestamp: reservation.booking_date.timestamp(),
        }))
        .await;

        Ok(reservation)
    }

    /// Confirm a RESERVED hold. A lapsed hold is expired on the spot and the
    /// confirm fails.
    pub async fn confirm(&self, caller: &Caller, id: Uuid) -> CoreResult<Reservation> {
        let reservation = self.load_for(caller, id).await?;

        if reservation.status != ReservationStatus::Reserved {
            return Err(CoreError::StateError(format!(
                "reservation {} is {}, only RESERVED can be confirmed",
                id, reservation.status
            )));
        }

        let now = self.clock.now();
        if reservation.is_lapsed(now) {
            match self.expire(&reservation).await {
                Ok(_) => {}
                Err(CoreError::StateError(_)) => {
                    debug!(reservation_id = %id, "lapsed hold already moved by another caller");
                }
                Err(e) => return Err(e),
            }
            return Err(CoreError::StateError(format!(
                "reservation {} hold lapsed at {}",
                id, reservation.expiry_date
            )));
        }

        let confirmed = self
            .commit(&reservation, ReservationStatus::Confirmed, now)
            .await?;

        info!(
            reservation_id = %id,
            user_id = confirmed.user_id,
            ticket_id = confirmed.ticket_id,
            "reservation confirmed"
        );
        self.publish(ReservationEvent::Confirmed(transition_event(&reservation, &confirmed)))
            .await;
        Ok(confirmed)
    }

    /// Cancel a RESERVED or CONFIRMED reservation. The remote release is
    /// best-effort and never blocks the transition.
    pub async fn cancel(&self, caller: &Caller, id: Uuid) -> CoreResult<Reservation> {
        let reservation = self.load_for(caller, id).await?;

        if !reservation.status.can_transition_to(ReservationStatus::Cancelled) {
            return Err(CoreError::StateError(format!(
                "reservation {} is already {}",
                id, reservation.status
            )));
        }

        let cancelled = self
            .commit(&reservation, ReservationStatus::Cancelled, self.clock.now())
            .await?;

        info!(
            reservation_id = %id,
            from = %reservation.status,
            ticket_id = cancelled.ticket_id,
            quantity = cancelled.quantity,
            "reservation cancelled"
        );
        let event = ReservationEvent::Cancelled(transition_event(&reservation, &cancelled));
        self.settle(cancelled.clone(), Some(event)).await;
        Ok(cancelled)
    }

    /// Move a lapsed RESERVED hold to EXPIRED and release its stock.
    pub async fn expire(&self, reservation: &Reservation) -> CoreResult<Reservation> {
        self.expire_at(reservation, self.clock.now()).await
    }

    /// Same as [`expire`](Self::expire), judging the lapse against `now` instead
    /// of the ledger clock. The expiry sweep passes its own scan time here.
    pub async fn expire_at(
        &self,
        reservation: &Reservation,
        now: DateTime<Utc>,
    ) -> CoreResult<Reservation> {
        if reservation.status != ReservationStatus::Reserved {
            return Err(CoreError::StateError(format!(
                "reservation {} is {}, only RESERVED can expire",
                reservation.id, reservation.status
            )));
        }

        if !reservation.is_lapsed(now) {
            return Err(CoreError::StateError(format!(
                "reservation {} holds until {}",
                reservation.id, reservation.expiry_date
            )));
        }

        let expired = self
            .commit(reservation, ReservationStatus::Expired, now)
            .await?;

        info!(
            reservation_id = %expired.id,
            ticket_id = expired.ticket_id,
            quantity = expired.quantity,
            "reservation expired"
        );
        let event = ReservationEvent::Expired(transition_event(reservation, &expired));
        self.settle(expired.clone(), Some(event)).await;
        Ok(expired)
    }

    pub async fn get(&self, caller: &Caller, id: Uuid) -> CoreResult<Reservation> {
        self.load_for(caller, id).await
    }

    /// A user's reservations, newest first.
    pub async fn list_by_user(
        &self,
        caller: &Caller,
        user_id: i64,
    ) -> CoreResult<Vec<Reservation>> {
        caller.ensure_can_act_for(user_id)?;
        Ok(self.store.find_by_user(user_id).await?)
    }

    pub async fn list_by_status(
        &self,
        caller: &Caller,
        status: ReservationStatus,
    ) -> CoreResult<Vec<Reservation>> {
        caller.ensure_privileged("listing reservations by status")?;
        Ok(self.store.find_by_status(status).await?)
    }

    pub async fn availability(&self, ticket_id: i64) -> CoreResult<TicketAvailability> {
        let active_reservations = self.store.count_active(ticket_id).await?;
        let active_quantity = self.store.sum_active_quantity(ticket_id).await?;
        let remaining = self.capacity.remaining(ticket_id).await?;
        Ok(TicketAvailability {
            ticket_id,
            active_reservations,
            active_quantity,
            capacity_limit: self.capacity.capacity_limit(),
            remaining,
        })
    }

    /// RESERVED holds whose expiry is strictly before `now`.
    pub async fn find_lapsed(&self, now: DateTime<Utc>) -> CoreResult<Vec<Reservation>> {
        Ok(self.store.find_expired_before(now).await?)
    }

    async fn load_for(&self, caller: &Caller, id: Uuid) -> CoreResult<Reservation> {
        let reservation = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("reservation {}", id)))?;
        caller.ensure_can_act_for(reservation.user_id)?;
        Ok(reservation)
    }

    async fn commit(
        &self,
        current: &Reservation,
        to: ReservationStatus,
        at: DateTime<Utc>,
    ) -> CoreResult<Reservation> {
        let change = StatusChange { to, at };
        self.store
            .transition(current.id, current.status, change)
            .await?
            .ok_or_else(|| {
                CoreError::StateError(format!(
                    "reservation {} changed concurrently, {} -> {} lost",
                    current.id, current.status, to
                ))
            })
    }

    async fn publish(&self, event: ReservationEvent) {
        publish_event(self.publisher.as_ref(), &event).await;
    }

    /// Return a closed hold's stock to the keeper, then announce the event.
    /// Both run on a spawned task, so a caller dropped after the commit still
    /// gets its release attempted and any drift reported.
    async fn settle(&self, closed: Reservation, event: Option<ReservationEvent>) {
        let coordinator = self.coordinator.clone();
        let publisher = self.publisher.clone();
        let reservation_id = closed.id;

        let task = tokio::spawn(async move {
            coordinator.release(&closed).await;
            if let Some(event) = event {
                publish_event(publisher.as_ref(), &event).await;
            }
        });
        if let Err(e) = task.await {
            error!(%reservation_id, error = %e, "release task aborted");
        }
    }
}

async fn publish_event(publisher: &dyn EventPublisher, event: &ReservationEvent) {
    if let Err(e) = publisher.publish(event).await {
        warn!(
            reservation_id = %event.reservation_id(),
            topic = event.topic(),
            error = %e,
            "failed to publish reservation event"
        );
    }
}

fn transition_event(before: &Reservation, after: &Reservation) -> ReservationTransitionEvent {
    ReservationTransitionEvent {
        reservation_id: after.id,
        user_id: after.user_id,
        ticket_id: after.ticket_id,
        quantity: after.quantity,
        from_status: before.status.to_string(),
        to_status: after.status.to_string(),
        timestamp: after.updated_at.timestamp(),
    }
}
