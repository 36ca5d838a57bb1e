use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use bigdecimal::BigDecimal;
use booking_core::{Caller, Reservation, ReservationStatus};
use booking_ledger::TicketAvailability;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveRequest {
    pub user_id: i64,
    pub ticket_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationResponse {
    pub id: Uuid,
    pub user_id: i64,
    pub ticket_id: i64,
    pub quantity: i32,
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

impl From<Reservation> for ReservationResponse {
    fn from(r: Reservation) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            ticket_id: r.ticket_id,
            quantity: r.quantity,
            unit_price: r.unit_price,
            total_amount: r.total_amount,
            status: r.status,
            booking_date: r.booking_date,
            expiry_date: r.expiry_date,
            confirmed_date: r.confirmed_date,
            cancelled_date: r.cancelled_date,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub expired: usize,
}

fn listing(reservations: Vec<Reservation>) -> Json<Vec<ReservationResponse>> {
    Json(reservations.into_iter().map(ReservationResponse::from).collect())
}

// ============================================================================
// Routes
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/bookings/reserve", post(reserve))
        .route("/api/bookings/process-expired", post(process_expired))
        .route("/api/bookings/{id}", get(get_reservation))
        .route("/api/bookings/{id}/confirm", post(confirm))
        .route("/api/bookings/{id}/cancel", post(cancel))
        .route("/api/bookings/user/{user_id}", get(list_by_user))
        .route("/api/bookings/status/{status}", get(list_by_status))
        .route("/api/bookings/ticket/{ticket_id}/availability", get(availability))
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn reserve(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<ReserveRequest>,
) -> Result<(StatusCode, Json<ReservationResponse>), AppError> {
    let reservation = state
        .ledger
        .reserve(&caller, req.user_id, req.ticket_id, req.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(reservation.into())))
}

pub async fn confirm(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationResponse>, AppError> {
    Ok(Json(state.ledger.confirm(&caller, id).await?.into()))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationResponse>, AppError> {
    tracing::info!(reservation_id = %id, "cancel requested");
    Ok(Json(state.ledger.cancel(&caller, id).await?.into()))
}

pub async fn get_reservation(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationResponse>, AppError> {
    Ok(Json(state.ledger.get(&caller, id).await?.into()))
}

pub async fn list_by_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<ReservationResponse>>, AppError> {
    Ok(listing(state.ledger.list_by_user(&caller, user_id).await?))
}

pub async fn list_by_status(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(status): Path<String>,
) -> Result<Json<Vec<ReservationResponse>>, AppError> {
    let status = status.parse::<ReservationStatus>()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;
    Ok(listing(state.ledger.list_by_status(&caller, status).await?))
}

pub async fn process_expired(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<SweepResponse>, AppError> {
    let expired = state.reaper.sweep_expired(&caller).await?;
    Ok(Json(SweepResponse { expired }))
}

pub async fn availability(
    State(state): State<AppState>,
    Path(ticket_id): Path<i64>,
) -> Result<Json<TicketAvailability>, AppError> {
    Ok(Json(state.ledger.availability(ticket_id).await?))
}
