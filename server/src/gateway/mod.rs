//! Payment gateway contract and the processors plugged in behind it.
//!
//! A gateway only talks to the outside world: it never touches inventory or
//! transaction state. A declined charge is an `Ok(ChargeOutcome::Failed)`;
//! `Err(GatewayError)` means the outcome is unknown (transport failure).

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::PurchaseTransaction;

pub mod card;
pub mod manual;
pub mod scripted;
pub mod wallet;

pub use card::CardGateway;
pub use manual::ManualTransferGateway;
pub use scripted::ScriptedGateway;
pub use wallet::WalletGateway;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Succeeded { provider_ref: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundOutcome {
    Succeeded,
    Failed { reason: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("payment gateway timed out")]
    Timeout,

    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &str;

    async fn charge(&self, txn: &PurchaseTransaction) -> Result<ChargeOutcome, GatewayError>;

    async fn refund(
        &self,
        txn: &PurchaseTransaction,
        reason: &str,
    ) -> Result<RefundOutcome, GatewayError>;
}

/// Opaque provider reference, e.g. `CARD_3F2A...`.
pub(crate) fn provider_ref(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple().to_string().to_uppercase())
}

/// Gateways selectable by name at checkout.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: BTreeMap<String, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `card`, `wallet` and `manual-transfer`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CardGateway::new()));
        registry.register(Arc::new(WalletGateway::new()));
        registry.register(Arc::new(ManualTransferGateway));
        registry
    }

    /// Adds a gateway, replacing any gateway already registered under the
    /// same name.
    pub fn register(&mut self, gateway: Arc<dyn PaymentGateway>) -> &mut Self {
        self.gateways.insert(gateway.name().to_string(), gateway);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PaymentGateway>> {
        self.gateways.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.gateways.keys().map(String::as_str).collect()
    }
}
