//! PostgreSQL ledger store.
//!
//! Inserts are conditional: a per-ticket advisory lock serializes writers for
//! one ticket while the active sum is re-checked, and the partial unique index
//! `uq_reservations_one_reserved` refuses a second RESERVED row per user and ticket.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use booking_core::{
    LedgerStore, Reservation, ReservationStatus, StatusChange, StoreError, StoreResult,
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

const COLUMNS: &str = "id, user_id, ticket_id, quantity, unit_price, total_amount, status, \
    booking_date, expiry_date, confirmed_date, cancelled_date, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    user_id: i64,
    ticket_id: i64,
    quantity: i32,
    unit_price: BigDecimal,
    total_amount: BigDecimal,
    status: String,
    booking_date: DateTime<Utc>,
    expiry_date: DateTime<Utc>,
    confirmed_date: Option<DateTime<Utc>>,
    cancelled_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = StoreError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<ReservationStatus>()
            .map_err(|e| StoreError::Backend(format!("reservation {}: {}", row.id, e)))?;

        Ok(Reservation {
            id: row.id,
            user_id: row.user_id,
            ticket_id: row.ticket_id,
            quantity: row.quantity,
            unit_price: row.unit_price,
            total_amount: row.total_amount,
            status,
            booking_date: row.booking_date,
            expiry_date: row.expiry_date,
            confirmed_date: row.confirmed_date,
            cancelled_date: row.cancelled_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn convert_all(rows: Vec<ReservationRow>) -> StoreResult<Vec<Reservation>> {
    rows.into_iter().map(Reservation::try_from).collect()
}

pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn insert(&self, reservation: &Reservation, capacity_limit: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(reservation.ticket_id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        let active: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM reservations \
             WHERE ticket_id = $1 AND status IN ('RESERVED', 'CONFIRMED')",
        )
        .bind(reservation.ticket_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;

        if active + i64::from(reservation.quantity) > capacity_limit {
            return Err(StoreError::CapacityExceeded(format!(
                "ticket {} has {} of {} held",
                reservation.ticket_id, active, capacity_limit
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO reservations (id, user_id, ticket_id, quantity, unit_price, total_amount,
                status, booking_date, expiry_date, confirmed_date, cancelled_date, created_at,
                updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(reservation.id)
        .bind(reservation.user_id)
        .bind(reservation.ticket_id)
        .bind(reservation.quantity)
        .bind(&reservation.unit_price)
        .bind(&reservation.total_amount)
        .bind(reservation.status.as_str())
        .bind(reservation.booking_date)
        .bind(reservation.expiry_date)
        .bind(reservation.confirmed_date)
        .bind(reservation.cancelled_date)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return StoreError::Duplicate(format!(
                        "user {} already holds ticket {}",
                        reservation.user_id, reservation.ticket_id
                    ));
                }
            }
            backend(e)
        })?;

        tx.commit().await.map_err(backend)?;
        debug!(
            reservation_id = %reservation.id,
            ticket_id = reservation.ticket_id,
            "reservation row inserted"
        );
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Reservation>> {
        let sql = format!("SELECT {} FROM reservations WHERE id = $1", COLUMNS);
        sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(Reservation::try_from)
            .transpose()
    }

    async fn find_by_user(&self, user_id: i64) -> StoreResult<Vec<Reservation>> {
        let sql = format!(
            "SELECT {} FROM reservations WHERE user_id = $1 ORDER BY booking_date DESC",
            COLUMNS
        );
        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        convert_all(rows)
    }

    async fn find_by_status(&self, status: ReservationStatus) -> StoreResult<Vec<Reservation>> {
        let sql = format!(
            "SELECT {} FROM reservations WHERE status = $1 ORDER BY booking_date",
            COLUMNS
        );
        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        convert_all(rows)
    }

    async fn find_expired_before(&self, now: DateTime<Utc>) -> StoreResult<Vec<Reservation>> {
        let sql = format!(
            "SELECT {} FROM reservations \
             WHERE status = 'RESERVED' AND expiry_date < $1 ORDER BY expiry_date",
            COLUMNS
        );
        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        convert_all(rows)
    }

    async fn count_active(&self, ticket_id: i64) -> StoreResult<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM reservations \
             WHERE ticket_id = $1 AND status IN ('RESERVED', 'CONFIRMED')",
        )
        .bind(ticket_id)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)
    }

    async fn sum_active_quantity(&self, ticket_id: i64) -> StoreResult<i64> {
        sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM reservations \
             WHERE ticket_id = $1 AND status IN ('RESERVED', 'CONFIRMED')",
        )
        .bind(ticket_id)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)
    }

    async fn exists_reserved(&self, user_id: i64, ticket_id: i64) -> StoreResult<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM reservations \
             WHERE user_id = $1 AND ticket_id = $2 AND status = 'RESERVED')",
        )
        .bind(user_id)
        .bind(ticket_id)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        change: StatusChange,
    ) -> StoreResult<Option<Reservation>> {
        let sql = format!(
            r#"
            UPDATE reservations
            SET status = $3,
                confirmed_date = CASE WHEN $3 = 'CONFIRMED' THEN $4 ELSE confirmed_date END,
                cancelled_date = CASE WHEN $3 = 'CANCELLED' THEN $4 ELSE cancelled_date END,
                updated_at = $4
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            COLUMNS
        );

        sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(id)
            .bind(expected.as_str())
            .bind(change.to.as_str())
            .bind(change.at)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(Reservation::try_from)
            .transpose()
    }
}
