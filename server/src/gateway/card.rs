use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use super::{provider_ref, ChargeOutcome, GatewayError, PaymentGateway, RefundOutcome};
use crate::models::PurchaseTransaction;

/// Card processor stand-in: approves every charge and refund after a
/// simulated network round trip.
#[derive(Debug, Clone, Default)]
pub struct CardGateway {
    latency: Duration,
}

impl CardGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl PaymentGateway for CardGateway {
    fn name(&self) -> &str {
        "card"
    }

    async fn charge(&self, txn: &PurchaseTransaction) -> Result<ChargeOutcome, GatewayError> {
        tokio::time::sleep(self.latency).await;
        let provider_ref = provider_ref("CARD");
        info!(
            transaction_id = %txn.id,
            amount = %txn.amount,
            provider_ref = %provider_ref,
            "Card charge approved"
        );
        Ok(ChargeOutcome::Succeeded { provider_ref })
    }

    async fn refund(
        &self,
        txn: &PurchaseTransaction,
        reason: &str,
    ) -> Result<RefundOutcome, GatewayError> {
        tokio::time::sleep(self.latency).await;
        info!(transaction_id = %txn.id, amount = %txn.amount, reason, "Card refund approved");
        Ok(RefundOutcome::Succeeded)
    }
}
