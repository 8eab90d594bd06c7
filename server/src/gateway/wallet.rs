use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use super::{provider_ref, ChargeOutcome, GatewayError, PaymentGateway, RefundOutcome};
use crate::models::PurchaseTransaction;

/// Digital wallet stand-in with the same approve-everything behavior as the
/// card processor, but its own reference namespace.
#[derive(Debug, Clone, Default)]
pub struct WalletGateway {
    latency: Duration,
}

impl WalletGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl PaymentGateway for WalletGateway {
    fn name(&self) -> &str {
        "wallet"
    }

    async fn charge(&self, txn: &PurchaseTransaction) -> Result<ChargeOutcome, GatewayError> {
        tokio::time::sleep(self.latency).await;
        let provider_ref = provider_ref("WALLET");
        info!(transaction_id = %txn.id, provider_ref = %provider_ref, "Wallet charge approved");
        Ok(ChargeOutcome::Succeeded { provider_ref })
    }

    async fn refund(
        &self,
        txn: &PurchaseTransaction,
        _reason: &str,
    ) -> Result<RefundOutcome, GatewayError> {
        tokio::time::sleep(self.latency).await;
        info!(transaction_id = %txn.id, "Wallet refund approved");
        Ok(RefundOutcome::Succeeded)
    }
}
