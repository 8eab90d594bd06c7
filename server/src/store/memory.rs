//! Single-process store with the same locking semantics as the Postgres
//! store: one async mutex per row, bounded waits, staged writes applied on
//! commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Store, StoreTx, TransactionFilter};
use crate::models::{Event, PurchaseTransaction, TicketTier, TransactionStatus};
use crate::utils::error::AppError;

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Tier(Uuid),
    Transaction(Uuid),
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Tier(id) => write!(f, "ticket tier {}", id),
            RowKey::Transaction(id) => write!(f, "transaction {}", id),
        }
    }
}

#[derive(Default)]
struct Tables {
    events: HashMap<Uuid, Event>,
    tiers: HashMap<Uuid, TicketTier>,
    transactions: HashMap<Uuid, PurchaseTransaction>,
}

#[derive(Clone)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    row_locks: Arc<Mutex<HashMap<RowKey, Arc<RowMutex<()>>>>>,
    lock_timeout: Duration,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            tables: Arc::default(),
            row_locks: Arc::default(),
            lock_timeout,
        }
    }

    /// Seeds an event, standing in for the organizer tooling.
    pub fn insert_event(&self, event: Event) {
        self.tables().events.insert(event.id, event);
    }

    /// Seeds a ticket tier, standing in for the organizer tooling.
    pub fn insert_tier(&self, tier: TicketTier) {
        self.tables().tiers.insert(tier.id, tier);
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn row_lock(&self, key: RowKey) -> Arc<RowMutex<()>> {
        let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key).or_default())
    }

    /// Drops map entries nobody holds or waits on. Waiters clone the `Arc`
    /// under the same map lock, so a count of one means the row is idle.
    fn forget_idle_locks(&self, keys: impl IntoIterator<Item = RowKey>) {
        let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            if locks.get(&key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(&key);
            }
        }
    }
}

struct MemoryTx {
    store: InMemoryStore,
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
    tiers: HashMap<Uuid, TicketTier>,
    transactions: HashMap<Uuid, PurchaseTransaction>,
}

impl MemoryTx {
    fn new(store: InMemoryStore) -> Self {
        Self {
            store,
            held: HashMap::new(),
            tiers: HashMap::new(),
            transactions: HashMap::new(),
        }
    }

    async fn acquire(&mut self, key: RowKey) -> Result<(), AppError> {
        if self.held.contains_key(&key) {
            return Ok(());
        }
        let lock = self.store.row_lock(key);
        match tokio::time::timeout(self.store.lock_timeout, lock.lock_owned()).await {
            Ok(guard) => {
                self.held.insert(key, guard);
                Ok(())
            }
            Err(_) => Err(AppError::Busy(format!(
                "Timed out waiting for a lock on {}",
                key
            ))),
        }
    }

    fn locked_tier(&mut self, tier_id: Uuid) -> Result<&mut TicketTier, AppError> {
        self.tiers.get_mut(&tier_id).ok_or_else(|| {
            AppError::InventoryInvariantViolation(format!(
                "write to ticket tier {} without holding its lock",
                tier_id
            ))
        })
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_tier(&mut self, tier_id: Uuid) -> Result<TicketTier, AppError> {
        self.acquire(RowKey::Tier(tier_id)).await?;
        if let Some(tier) = self.tiers.get(&tier_id) {
            return Ok(tier.clone());
        }
        let tier = self
            .store
            .tables()
            .tiers
            .get(&tier_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Ticket tier {} was not found", tier_id)))?;
        self.tiers.insert(tier_id, tier.clone());
        Ok(tier)
    }

    async fn set_sold(&mut self, tier_id: Uuid, sold: i32) -> Result<(), AppError> {
        let tier = self.locked_tier(tier_id)?;
        if sold < 0 || sold > tier.quantity {
            return Err(AppError::InventoryInvariantViolation(format!(
                "sold={} outside 0..={} on ticket tier {}",
                sold, tier.quantity, tier_id
            )));
        }
        tier.sold = sold;
        tier.updated_at = Utc::now();
        Ok(())
    }

    async fn set_quantity(&mut self, tier_id: Uuid, quantity: i32) -> Result<(), AppError> {
        let tier = self.locked_tier(tier_id)?;
        if quantity <= 0 || quantity < tier.sold {
            return Err(AppError::InventoryInvariantViolation(format!(
                "quantity={} below sold={} on ticket tier {}",
                quantity, tier.sold, tier_id
            )));
        }
        tier.quantity = quantity;
        tier.updated_at = Utc::now();
        Ok(())
    }

    async fn lock_transaction(&mut self, id: Uuid) -> Result<PurchaseTransaction, AppError> {
        self.acquire(RowKey::Transaction(id)).await?;
        if let Some(txn) = self.transactions.get(&id) {
            return Ok(txn.clone());
        }
        self.store
            .tables()
            .transactions
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} was not found", id)))
    }

    async fn insert_transaction(&mut self, txn: &PurchaseTransaction) -> Result<(), AppError> {
        let duplicate = {
            let tables = self.store.tables();
            tables.transactions.contains_key(&txn.id)
                || tables
                    .transactions
                    .values()
                    .any(|existing| existing.gateway_ref == txn.gateway_ref)
        };
        if duplicate || self.transactions.contains_key(&txn.id) {
            return Err(AppError::InternalServerError(format!(
                "transaction {} collides with an existing row",
                txn.id
            )));
        }
        self.acquire(RowKey::Transaction(txn.id)).await?;
        self.transactions.insert(txn.id, txn.clone());
        Ok(())
    }

    async fn update_transaction(&mut self, txn: &PurchaseTransaction) -> Result<(), AppError> {
        if !self.held.contains_key(&RowKey::Transaction(txn.id)) {
            return Err(AppError::InternalServerError(format!(
                "update of transaction {} without holding its lock",
                txn.id
            )));
        }
        self.transactions.insert(txn.id, txn.clone());
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), AppError> {
        let tiers = std::mem::take(&mut self.tiers);
        let transactions = std::mem::take(&mut self.transactions);
        let mut tables = self.store.tables();
        tables.tiers.extend(tiers);
        tables.transactions.extend(transactions);
        Ok(())
    }
}

impl Drop for MemoryTx {
    // Staged writes still here are a rollback; the row locks go either way.
    fn drop(&mut self) {
        let keys: Vec<RowKey> = self.held.keys().copied().collect();
        self.held.clear();
        self.store.forget_idle_locks(keys);
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        Ok(Box::new(MemoryTx::new(self.clone())))
    }

    async fn event(&self, id: Uuid) -> Result<Option<Event>, AppError> {
        Ok(self.tables().events.get(&id).cloned())
    }

    async fn tier(&self, id: Uuid) -> Result<Option<TicketTier>, AppError> {
        Ok(self.tables().tiers.get(&id).cloned())
    }

    async fn transaction(&self, id: Uuid) -> Result<Option<PurchaseTransaction>, AppError> {
        Ok(self.tables().transactions.get(&id).cloned())
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<(Vec<PurchaseTransaction>, i64), AppError> {
        let tables = self.tables();
        let mut matching: Vec<&PurchaseTransaction> = tables
            .transactions
            .values()
            .filter(|txn| filter.matches(txn, tables.events.get(&txn.event_id)))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(filter.offset().max(0) as usize)
            .take(filter.per_page.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, AppError> {
        let tables = self.tables();
        let mut stale: Vec<&PurchaseTransaction> = tables
            .transactions
            .values()
            .filter(|txn| txn.status == TransactionStatus::Pending && txn.created_at < cutoff)
            .collect();
        stale.sort_by_key(|txn| txn.created_at);
        Ok(stale
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|txn| txn.id)
            .collect())
    }
}
