use async_trait::async_trait;

use super::{ChargeOutcome, GatewayError, PaymentGateway, RefundOutcome};
use crate::models::PurchaseTransaction;

pub const MANUAL_VERIFICATION_REASON: &str = "requires manual verification";

/// Bank/manual transfer. Settlement happens out of band, so it is never a
/// checkout path: every charge is declined.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualTransferGateway;

#[async_trait]
impl PaymentGateway for ManualTransferGateway {
    fn name(&self) -> &str {
        "manual-transfer"
    }

    async fn charge(&self, _txn: &PurchaseTransaction) -> Result<ChargeOutcome, GatewayError> {
        Ok(ChargeOutcome::Failed {
            reason: MANUAL_VERIFICATION_REASON.to_string(),
        })
    }

    async fn refund(
        &self,
        _txn: &PurchaseTransaction,
        _reason: &str,
    ) -> Result<RefundOutcome, GatewayError> {
        Ok(RefundOutcome::Failed {
            reason: MANUAL_VERIFICATION_REASON.to_string(),
        })
    }
}
