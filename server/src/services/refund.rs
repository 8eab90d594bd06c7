use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::Engine;
use crate::access::{Access, Action, Resource};
use crate::gateway::{GatewayError, RefundOutcome};
use crate::inventory;
use crate::models::{Actor, TransactionStatus};
use crate::utils::error::AppError;

pub const MAX_REFUND_REASON_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct RefundReceipt {
    pub transaction_id: Uuid,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub quantity: i32,
    pub refunded_at: DateTime<Utc>,
}

impl Engine {
    /// Reverses a completed purchase and returns its tickets to the tier.
    ///
    /// The transaction row stays locked from the eligibility check through
    /// the gateway call to the commit, so a purchase is refunded at most
    /// once. The tier row is locked before the gateway is called, so once
    /// the money moves nothing can keep the tickets from being returned.
    /// A declined refund changes nothing.
    #[instrument(skip_all, fields(actor_id = %actor.id, transaction_id = %transaction_id))]
    pub async fn refund(
        &self,
        actor: &Actor,
        transaction_id: Uuid,
        reason: &str,
    ) -> Result<RefundReceipt, AppError> {
        let reason = reason.trim();
        if reason.is_empty() || reason.chars().count() > MAX_REFUND_REASON_CHARS {
            return Err(AppError::InvalidInput(format!(
                "Refund reason must be between 1 and {} characters",
                MAX_REFUND_REASON_CHARS
            )));
        }

        let mut scope = self.store.begin().await?;
        let mut txn = scope.lock_transaction(transaction_id).await?;
        let event = self.store.event(txn.event_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("Event {} was not found", txn.event_id))
        })?;

        let access = self.access.authorize(
            actor,
            Resource::Transaction {
                txn: &txn,
                event: &event,
            },
            Action::Refund,
        );
        if access != Access::Full {
            return Err(AppError::Unauthorized(
                "You can only refund your own transactions".to_string(),
            ));
        }

        let now = self.clock.now();
        if txn.status != TransactionStatus::Completed {
            return Err(AppError::NotRefundable(format!(
                "Only completed transactions can be refunded (this one is {})",
                txn.status
            )));
        }
        if event.has_started(now) {
            return Err(AppError::NotRefundable(
                "Refunds are closed once the event has started".to_string(),
            ));
        }

        let gateway = self.gateways.get(&txn.payment_gateway).ok_or_else(|| {
            AppError::RefundFailed(format!(
                "Payment gateway '{}' is not available",
                txn.payment_gateway
            ))
        })?;
        scope.lock_tier(txn.tier_id).await?;

        let outcome = tokio::time::timeout(self.policy.gateway_timeout, gateway.refund(&txn, reason))
            .await
            .unwrap_or(Err(GatewayError::Timeout));

        match outcome {
            Ok(RefundOutcome::Succeeded) => {}
            Ok(RefundOutcome::Failed { reason }) => {
                warn!(%reason, "Refund declined by gateway");
                return Err(AppError::RefundFailed(reason));
            }
            Err(err) => {
                warn!(error = %err, "Refund outcome unknown");
                return Err(AppError::ExternalServiceError(format!(
                    "Refund could not be completed: {}",
                    err
                )));
            }
        }

        txn.refund(reason, now)?;
        let released = inventory::release(scope.as_mut(), txn.tier_id, txn.quantity).await?;
        scope.update_transaction(&txn).await?;
        scope.commit().await?;
        released.ensure_exact()?;

        info!(quantity = txn.quantity, "Refund completed, tickets returned to inventory");
        Ok(RefundReceipt {
            transaction_id: txn.id,
            status: txn.status,
            amount: txn.amount,
            quantity: txn.quantity,
            refunded_at: now,
        })
    }
}
