use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::Engine;
use crate::gateway::{ChargeOutcome, GatewayError, PaymentGateway, RefundOutcome};
use crate::inventory;
use crate::models::{
    Actor, Event, PurchaseTransaction, TicketTier, TransactionStatus,
};
use crate::utils::error::AppError;

/// Each attempt can itself wait a full lock timeout on the tier row.
const RELEASE_ATTEMPTS: u32 = 5;
const RELEASE_BACKOFF: Duration = Duration::from_millis(50);
const UNRECORDED_SALE_REASON: &str = "sale could not be recorded";

#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseRequest {
    pub tier_id: Uuid,
    pub quantity: i32,
    pub payment_gateway: String,
    #[serde(default)]
    pub payment_data: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseReceipt {
    pub transaction_id: Uuid,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub quantity: i32,
    pub gateway_ref: String,
}

impl From<PurchaseTransaction> for PurchaseReceipt {
    fn from(txn: PurchaseTransaction) -> Self {
        Self {
            transaction_id: txn.id,
            status: txn.status,
            amount: txn.amount,
            quantity: txn.quantity,
            gateway_ref: txn.gateway_ref,
        }
    }
}

impl Engine {
    /// Sells `quantity` tickets of a tier to `buyer`.
    ///
    /// The reservation is committed before the gateway is called, and every
    /// path that does not end in `completed` hands the tickets back.
    #[instrument(
        skip_all,
        fields(
            buyer_id = %buyer.id,
            tier_id = %request.tier_id,
            quantity = request.quantity,
            gateway = %request.payment_gateway,
        )
    )]
    pub async fn purchase(
        &self,
        buyer: &Actor,
        request: PurchaseRequest,
    ) -> Result<PurchaseReceipt, AppError> {
        let now = self.clock.now();
        let tier = self.store.tier(request.tier_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("Ticket tier {} was not found", request.tier_id))
        })?;
        let event = self.store.event(tier.event_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("Event {} was not found", tier.event_id))
        })?;

        self.check_purchase_rules(&event, &tier, request.quantity, now)?;

        let gateway = self.gateways.get(&request.payment_gateway).ok_or_else(|| {
            AppError::InvalidInput(format!(
                "Unsupported payment gateway '{}'",
                request.payment_gateway
            ))
        })?;

        let amount = tier.total_for(request.quantity);
        let pending = PurchaseTransaction::pending(
            buyer.id,
            tier.id,
            tier.event_id,
            request.quantity,
            amount,
            gateway.name(),
            request.payment_data,
            now,
        );

        self.hold_reservation(&pending).await?;
        info!(transaction_id = %pending.id, %amount, "Reservation held, charging gateway");

        self.settle(pending, gateway.as_ref()).await
    }

    fn check_purchase_rules(
        &self,
        event: &Event,
        tier: &TicketTier,
        quantity: i32,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), AppError> {
        if !event.is_sellable() {
            return Err(AppError::NotSellable(
                "Event is not available for ticket purchase".to_string(),
            ));
        }
        if event.has_started(now) {
            return Err(AppError::NotSellable(
                "Cannot purchase tickets for events that have already started".to_string(),
            ));
        }
        if !tier.sale_window_contains(now) {
            return Err(AppError::OutOfWindow(
                "Ticket sales are not active for this ticket".to_string(),
            ));
        }
        let cap = self.policy.max_tickets_per_purchase;
        if !(1..=cap).contains(&quantity) {
            return Err(AppError::InvalidInput(format!(
                "Quantity must be between 1 and {}",
                cap
            )));
        }
        Ok(())
    }

    /// Records the pending transaction and claims its tickets in one scope.
    /// A shortage rolls back both, so no pending row survives a sold-out
    /// attempt.
    async fn hold_reservation(&self, pending: &PurchaseTransaction) -> Result<(), AppError> {
        let mut scope = self.store.begin().await?;
        scope.insert_transaction(pending).await?;
        inventory::reserve(scope.as_mut(), pending.tier_id, pending.quantity).await?;
        scope.commit().await
    }

    async fn settle(
        &self,
        pending: PurchaseTransaction,
        gateway: &dyn PaymentGateway,
    ) -> Result<PurchaseReceipt, AppError> {
        let charged = tokio::time::timeout(self.policy.gateway_timeout, gateway.charge(&pending))
            .await
            .unwrap_or(Err(GatewayError::Timeout));

        match charged {
            Ok(ChargeOutcome::Succeeded { provider_ref }) => {
                match self.complete_purchase(pending.id, provider_ref.clone()).await {
                    Ok(txn) => Ok(txn.into()),
                    Err(err) => {
                        error!(
                            transaction_id = %pending.id,
                            %provider_ref,
                            error = %err,
                            "Charge succeeded but the sale could not be recorded"
                        );
                        let charged = PurchaseTransaction {
                            gateway_ref: provider_ref,
                            ..pending
                        };
                        self.reverse_charge(&charged, gateway).await;
                        self.compensate(charged.id, UNRECORDED_SALE_REASON).await;
                        Err(err)
                    }
                }
            }
            Ok(ChargeOutcome::Failed { reason }) => {
                warn!(transaction_id = %pending.id, %reason, "Payment declined");
                match self.release_reservation(pending.id, &reason).await {
                    Err(err) if err.is_fatal() => Err(err),
                    Err(err) => {
                        error!(
                            transaction_id = %pending.id,
                            error = %err,
                            "Declined reservation could not be released; leaving it to the reconciliation sweep"
                        );
                        Err(AppError::PaymentFailed(reason))
                    }
                    Ok(_) => Err(AppError::PaymentFailed(reason)),
                }
            }
            Err(err) => {
                warn!(transaction_id = %pending.id, error = %err, "Payment outcome unknown");
                self.compensate(pending.id, &err.to_string()).await;
                Err(AppError::ExternalServiceError(format!(
                    "Payment could not be completed: {}",
                    err
                )))
            }
        }
    }

    /// Gives the money back when a charge went through but the sale was not
    /// recorded. A reversal that does not go through is logged for manual
    /// follow-up with the provider reference.
    async fn reverse_charge(&self, charged: &PurchaseTransaction, gateway: &dyn PaymentGateway) {
        let reversed = tokio::time::timeout(
            self.policy.gateway_timeout,
            gateway.refund(charged, UNRECORDED_SALE_REASON),
        )
        .await
        .unwrap_or(Err(GatewayError::Timeout));

        match reversed {
            Ok(RefundOutcome::Succeeded) => {
                info!(transaction_id = %charged.id, "Charge reversed after failed completion");
            }
            Ok(RefundOutcome::Failed { reason }) => {
                error!(
                    transaction_id = %charged.id,
                    provider_ref = %charged.gateway_ref,
                    %reason,
                    "Charge could not be reversed; needs manual follow-up"
                );
            }
            Err(err) => {
                error!(
                    transaction_id = %charged.id,
                    provider_ref = %charged.gateway_ref,
                    error = %err,
                    "Charge reversal outcome unknown; needs manual follow-up"
                );
            }
        }
    }

    async fn complete_purchase(
        &self,
        id: Uuid,
        provider_ref: String,
    ) -> Result<PurchaseTransaction, AppError> {
        let mut scope = self.store.begin().await?;
        let mut txn = scope.lock_transaction(id).await?;
        txn.complete(provider_ref, self.clock.now())?;
        scope.update_transaction(&txn).await?;
        scope.commit().await?;

        info!(transaction_id = %id, "Purchase completed");
        Ok(txn)
    }

    /// Marks a still-pending transaction `failed` and returns its tickets.
    /// Returns `false` when someone else already resolved it.
    pub(crate) async fn fail_and_release(&self, id: Uuid, reason: &str) -> Result<bool, AppError> {
        let mut scope = self.store.begin().await?;
        let mut txn = scope.lock_transaction(id).await?;
        if txn.status != TransactionStatus::Pending {
            return Ok(false);
        }

        txn.fail(reason, self.clock.now())?;
        let released = inventory::release(scope.as_mut(), txn.tier_id, txn.quantity).await?;
        scope.update_transaction(&txn).await?;
        scope.commit().await?;
        released.ensure_exact()?;

        info!(transaction_id = %id, quantity = txn.quantity, "Reservation released");
        Ok(true)
    }

    /// [`Self::fail_and_release`], retried with backoff while the rows are
    /// contended.
    async fn release_reservation(&self, id: Uuid, reason: &str) -> Result<bool, AppError> {
        let mut backoff = RELEASE_BACKOFF;
        let mut attempt = 1;
        loop {
            match self.fail_and_release(id, reason).await {
                Err(AppError::Busy(message)) if attempt < RELEASE_ATTEMPTS => {
                    warn!(transaction_id = %id, attempt, %message, "Release contended, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    async fn compensate(&self, id: Uuid, reason: &str) {
        if let Err(err) = self.release_reservation(id, reason).await {
            error!(
                transaction_id = %id,
                error = %err,
                "Reservation could not be released; leaving it to the reconciliation sweep"
            );
        }
    }
}
