//! The purchase engine: orchestrates inventory, the transaction ledger and
//! payment gateways on behalf of an explicitly passed actor.

use std::sync::Arc;
use std::time::Duration;

use crate::access::AccessControl;
use crate::clock::Clock;
use crate::gateway::GatewayRegistry;
use crate::store::Store;

pub mod capacity;
pub mod purchase;
pub mod query;
pub mod reconcile;
pub mod refund;

pub use purchase::{PurchaseReceipt, PurchaseRequest};
pub use query::{ListTransactionsQuery, TicketTiming};
pub use reconcile::{spawn_reconciler, ReconcileReport};
pub use refund::RefundReceipt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchasePolicy {
    pub max_tickets_per_purchase: i32,
    pub gateway_timeout: Duration,
    /// Age after which a still-pending purchase is presumed abandoned.
    pub pending_grace: Duration,
}

impl Default for PurchasePolicy {
    fn default() -> Self {
        Self {
            max_tickets_per_purchase: 10,
            gateway_timeout: Duration::from_secs(10),
            pending_grace: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn Store>,
    gateways: GatewayRegistry,
    access: Arc<dyn AccessControl>,
    clock: Arc<dyn Clock>,
    policy: PurchasePolicy,
}

impl Engine {
    pub fn new(
        store: Arc<dyn Store>,
        gateways: GatewayRegistry,
        access: Arc<dyn AccessControl>,
        clock: Arc<dyn Clock>,
        policy: PurchasePolicy,
    ) -> Self {
        Self {
            store,
            gateways,
            access,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &PurchasePolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }
}
