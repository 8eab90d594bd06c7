use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, Postgres};
use sqlx::{QueryBuilder, Row, Transaction};
use std::time::Duration;
use uuid::Uuid;

use super::{Store, StoreTx, TransactionFilter};
use crate::models::{Event, PurchaseTransaction, TicketTier};
use crate::utils::error::AppError;

const EVENT_COLUMNS: &str = "id, organizer_id, title, status, start_time, end_time";

const TIER_COLUMNS: &str = "id, event_id, name, kind, price, quantity, sold, \
     sale_start, sale_end, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "t.id, t.buyer_id, t.tier_id, t.event_id, t.quantity, \
     t.amount, t.status, t.payment_gateway, t.gateway_ref, t.payment_data, t.refunded_at, \
     t.created_at, t.updated_at";

/// SQLSTATE raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";
/// SQLSTATE raised by the `sold` / `quantity` CHECK constraints.
const CHECK_VIOLATION: &str = "23514";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn map_write_error(err: sqlx::Error, what: &str) -> AppError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some(LOCK_NOT_AVAILABLE) => {
                return AppError::Busy(format!("Timed out waiting for a lock on {}", what));
            }
            Some(CHECK_VIOLATION) => {
                tracing::error!(error = %db, target_row = %what, "Storage rejected inventory write");
                return AppError::InventoryInvariantViolation(format!(
                    "storage constraint rejected write to {}",
                    what
                ));
            }
            _ => {}
        }
    }
    AppError::DatabaseError(err)
}

pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn lock_tier(&mut self, tier_id: Uuid) -> Result<TicketTier, AppError> {
        let sql = format!(
            "SELECT {} FROM ticket_tiers WHERE id = $1 FOR UPDATE",
            TIER_COLUMNS
        );
        sqlx::query_as::<_, TicketTier>(&sql)
            .bind(tier_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_write_error(e, &format!("ticket tier {}", tier_id)))?
            .ok_or_else(|| AppError::NotFound(format!("Ticket tier {} was not found", tier_id)))
    }

    async fn set_sold(&mut self, tier_id: Uuid, sold: i32) -> Result<(), AppError> {
        sqlx::query("UPDATE ticket_tiers SET sold = $2, updated_at = NOW() WHERE id = $1")
            .bind(tier_id)
            .bind(sold)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_write_error(e, &format!("ticket tier {}", tier_id)))?;
        Ok(())
    }

    async fn set_quantity(&mut self, tier_id: Uuid, quantity: i32) -> Result<(), AppError> {
        sqlx::query("UPDATE ticket_tiers SET quantity = $2, updated_at = NOW() WHERE id = $1")
            .bind(tier_id)
            .bind(quantity)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_write_error(e, &format!("ticket tier {}", tier_id)))?;
        Ok(())
    }

    async fn lock_transaction(&mut self, id: Uuid) -> Result<PurchaseTransaction, AppError> {
        let sql = format!(
            "SELECT {} FROM purchase_transactions t WHERE t.id = $1 FOR UPDATE",
            TRANSACTION_COLUMNS
        );
        sqlx::query_as::<_, PurchaseTransaction>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_write_error(e, &format!("transaction {}", id)))?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} was not found", id)))
    }

    async fn insert_transaction(&mut self, txn: &PurchaseTransaction) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO purchase_transactions
                (id, buyer_id, tier_id, event_id, quantity, amount, status, payment_gateway,
                 gateway_ref, payment_data, refunded_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(txn.id)
        .bind(txn.buyer_id)
        .bind(txn.tier_id)
        .bind(txn.event_id)
        .bind(txn.quantity)
        .bind(txn.amount)
        .bind(txn.status)
        .bind(&txn.payment_gateway)
        .bind(&txn.gateway_ref)
        .bind(&txn.payment_data)
        .bind(txn.refunded_at)
        .bind(txn.created_at)
        .bind(txn.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_transaction(&mut self, txn: &PurchaseTransaction) -> Result<(), AppError> {
        // amount and quantity are immutable and deliberately not written
        sqlx::query(
            r#"
            UPDATE purchase_transactions
            SET status = $2, gateway_ref = $3, payment_data = $4, refunded_at = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(txn.id)
        .bind(txn.status)
        .bind(&txn.gateway_ref)
        .bind(&txn.payment_data)
        .bind(txn.refunded_at)
        .bind(txn.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }
}

fn push_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, filter: &TransactionFilter) {
    builder.push(" WHERE TRUE");
    if let Some(buyer_id) = filter.buyer_id {
        builder.push(" AND t.buyer_id = ").push_bind(buyer_id);
    }
    if let Some(status) = filter.status {
        builder.push(" AND t.status = ").push_bind(status);
    }
    if let Some(event_id) = filter.event_id {
        builder.push(" AND t.event_id = ").push_bind(event_id);
    }
    if let Some(gateway) = &filter.payment_gateway {
        builder.push(" AND t.payment_gateway = ").push_bind(gateway.clone());
    }
    if let Some(from) = filter.created_from {
        builder.push(" AND t.created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.created_to {
        builder.push(" AND t.created_at <= ").push_bind(to);
    }
    if let Some(after) = filter.event_starts_after {
        builder.push(" AND e.start_time > ").push_bind(after);
    }
    if let Some(before) = filter.event_ended_before {
        builder.push(" AND e.end_time < ").push_bind(before);
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let mut tx = self.pool.begin().await?;
        // SET LOCAL cannot take bind parameters
        let timeout_ms = self.lock_timeout.as_millis().max(1);
        sqlx::query(&format!("SET LOCAL lock_timeout = '{}ms'", timeout_ms))
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgStoreTx { tx }))
    }

    async fn event(&self, id: Uuid) -> Result<Option<Event>, AppError> {
        let sql = format!("SELECT {} FROM events WHERE id = $1", EVENT_COLUMNS);
        Ok(sqlx::query_as::<_, Event>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn tier(&self, id: Uuid) -> Result<Option<TicketTier>, AppError> {
        let sql = format!("SELECT {} FROM ticket_tiers WHERE id = $1", TIER_COLUMNS);
        Ok(sqlx::query_as::<_, TicketTier>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn transaction(&self, id: Uuid) -> Result<Option<PurchaseTransaction>, AppError> {
        let sql = format!(
            "SELECT {} FROM purchase_transactions t WHERE t.id = $1",
            TRANSACTION_COLUMNS
        );
        Ok(sqlx::query_as::<_, PurchaseTransaction>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<(Vec<PurchaseTransaction>, i64), AppError> {
        let mut count = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM purchase_transactions t JOIN events e ON e.id = t.event_id",
        );
        push_filters(&mut count, filter);
        let total: i64 = count.build().fetch_one(&self.pool).await?.try_get(0)?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM purchase_transactions t JOIN events e ON e.id = t.event_id",
            TRANSACTION_COLUMNS
        ));
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY t.created_at DESC, t.id DESC LIMIT ")
            .push_bind(filter.per_page)
            .push(" OFFSET ")
            .push_bind(filter.offset());
        let rows = select
            .build_query_as::<PurchaseTransaction>()
            .fetch_all(&self.pool)
            .await?;

        Ok((rows, total))
    }

    async fn stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, AppError> {
        Ok(sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM purchase_transactions
            WHERE status = 'pending' AND created_at < $1
            ORDER BY created_at
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }
}
