//! Persistence seams for the purchase engine.
//!
//! Every write to a tier's `sold` count or a transaction's status happens
//! inside a [`StoreTx`] scope. Locks taken through the scope are held until
//! it is committed or dropped; dropping without [`StoreTx::commit`] rolls
//! back every staged write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Event, PurchaseTransaction, TicketTier, TransactionStatus};
use crate::utils::error::AppError;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// One transactional scope against the store.
#[async_trait]
pub trait StoreTx: Send {
    /// Takes the tier's row lock (`SELECT ... FOR UPDATE`) and returns the
    /// row as seen under that lock. Waiting longer than the configured lock
    /// timeout yields [`AppError::Busy`].
    async fn lock_tier(&mut self, tier_id: Uuid) -> Result<TicketTier, AppError>;

    /// Writes a new `sold` value for a tier already locked in this scope.
    /// Only [`crate::inventory`] calls this.
    async fn set_sold(&mut self, tier_id: Uuid, sold: i32) -> Result<(), AppError>;

    /// Writes a new capacity for a tier already locked in this scope.
    async fn set_quantity(&mut self, tier_id: Uuid, quantity: i32) -> Result<(), AppError>;

    /// Takes the transaction's row lock. Callers that also need a tier lock
    /// must take the transaction lock first.
    async fn lock_transaction(&mut self, id: Uuid) -> Result<PurchaseTransaction, AppError>;

    async fn insert_transaction(&mut self, txn: &PurchaseTransaction) -> Result<(), AppError>;

    async fn update_transaction(&mut self, txn: &PurchaseTransaction) -> Result<(), AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError>;

    async fn event(&self, id: Uuid) -> Result<Option<Event>, AppError>;

    async fn tier(&self, id: Uuid) -> Result<Option<TicketTier>, AppError>;

    async fn transaction(&self, id: Uuid) -> Result<Option<PurchaseTransaction>, AppError>;

    /// Matching transactions newest first, plus the unpaginated total.
    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<(Vec<PurchaseTransaction>, i64), AppError>;

    /// Ids of `pending` transactions created before `cutoff`, oldest first.
    async fn stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, AppError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionFilter {
    pub buyer_id: Option<Uuid>,
    pub status: Option<TransactionStatus>,
    pub event_id: Option<Uuid>,
    pub payment_gateway: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    /// Only transactions whose event starts after this instant.
    pub event_starts_after: Option<DateTime<Utc>>,
    /// Only transactions whose event ended before this instant.
    pub event_ended_before: Option<DateTime<Utc>>,
    pub page: i64,
    pub per_page: i64,
}

impl Default for TransactionFilter {
    fn default() -> Self {
        Self {
            buyer_id: None,
            status: None,
            event_id: None,
            payment_gateway: None,
            created_from: None,
            created_to: None,
            event_starts_after: None,
            event_ended_before: None,
            page: 1,
            per_page: 15,
        }
    }
}

impl TransactionFilter {
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.per_page
    }

    pub fn matches(&self, txn: &PurchaseTransaction, event: Option<&Event>) -> bool {
        if self.buyer_id.is_some_and(|id| id != txn.buyer_id)
            || self.status.is_some_and(|s| s != txn.status)
            || self.event_id.is_some_and(|id| id != txn.event_id)
            || self
                .payment_gateway
                .as_deref()
                .is_some_and(|g| g != txn.payment_gateway)
            || self.created_from.is_some_and(|from| txn.created_at < from)
            || self.created_to.is_some_and(|to| txn.created_at > to)
        {
            return false;
        }
        if let Some(after) = self.event_starts_after {
            if !event.is_some_and(|e| e.start_time > after) {
                return false;
            }
        }
        if let Some(before) = self.event_ended_before {
            if !event.is_some_and(|e| e.end_time.is_some_and(|end| end < before)) {
                return false;
            }
        }
        true
    }
}
