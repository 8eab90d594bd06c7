use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Refunded => "refunded",
        }
    }

    /// The whole lifecycle graph: `pending -> completed | failed`,
    /// `completed -> refunded`.
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Completed) | (Pending, Failed) | (Completed, Refunded)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "refunded" => Ok(TransactionStatus::Refunded),
            other => Err(format!("unknown transaction status '{}'", other)),
        }
    }
}

/// Audit record of one purchase attempt. Rows are never deleted; `amount`
/// is fixed at creation and status only moves forward through
/// [`TransactionStatus::can_transition_to`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PurchaseTransaction {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub tier_id: Uuid,
    pub event_id: Uuid,
    pub quantity: i32,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub payment_gateway: String,
    pub gateway_ref: String,
    pub payment_data: Option<Value>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const REDACTED: &str = "[redacted]";

impl PurchaseTransaction {
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        buyer_id: Uuid,
        tier_id: Uuid,
        event_id: Uuid,
        quantity: i32,
        amount: Decimal,
        payment_gateway: impl Into<String>,
        payment_data: Option<Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            buyer_id,
            tier_id,
            event_id,
            quantity,
            amount,
            status: TransactionStatus::Pending,
            payment_gateway: payment_gateway.into(),
            gateway_ref: format!("TXN_{}", Uuid::new_v4().simple().to_string().to_uppercase()),
            payment_data,
            refunded_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn complete(&mut self, provider_ref: String, now: DateTime<Utc>) -> Result<(), AppError> {
        self.ensure_transition(TransactionStatus::Completed)?;
        self.status = TransactionStatus::Completed;
        self.gateway_ref = provider_ref;
        self.updated_at = now;
        Ok(())
    }

    pub fn fail(&mut self, reason: &str, now: DateTime<Utc>) -> Result<(), AppError> {
        self.ensure_transition(TransactionStatus::Failed)?;
        self.status = TransactionStatus::Failed;
        self.annotate("failure_reason", Value::String(reason.to_string()));
        self.updated_at = now;
        Ok(())
    }

    pub fn refund(&mut self, reason: &str, now: DateTime<Utc>) -> Result<(), AppError> {
        self.ensure_transition(TransactionStatus::Refunded)?;
        self.status = TransactionStatus::Refunded;
        self.refunded_at = Some(now);
        self.annotate("refund_reason", Value::String(reason.to_string()));
        self.annotate("refund_date", Value::String(now.to_rfc3339()));
        self.updated_at = now;
        Ok(())
    }

    /// Checked transition to an arbitrary status; rejects anything outside
    /// the lifecycle graph without touching the record.
    pub fn transition_to(
        &mut self,
        next: TransactionStatus,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.ensure_transition(next)?;
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// View for callers allowed to see the purchase but not its payment
    /// details.
    pub fn redacted(mut self) -> Self {
        self.payment_data = None;
        self.gateway_ref = REDACTED.to_string();
        self
    }

    fn ensure_transition(&self, next: TransactionStatus) -> Result<(), AppError> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(AppError::InvalidTransition {
                from: self.status,
                to: next,
            })
        }
    }

    fn annotate(&mut self, key: &str, value: Value) {
        let mut fields = match self.payment_data.take() {
            Some(Value::Object(fields)) => fields,
            Some(other) => {
                let mut fields = Map::new();
                fields.insert("payload".to_string(), other);
                fields
            }
            None => Map::new(),
        };
        fields.insert(key.to_string(), value);
        self.payment_data = Some(Value::Object(fields));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn pending() -> PurchaseTransaction {
        PurchaseTransaction::pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            2,
            dec!(40.00),
            "card",
            Some(json!({ "token": "tok_visa" })),
            Utc::now(),
        )
    }

    fn in_status(status: TransactionStatus) -> PurchaseTransaction {
        let mut txn = pending();
        txn.status = status;
        txn
    }

    #[test]
    fn test_new_transaction_is_pending_with_internal_ref() {
        let txn = pending();
        assert_eq!(txn.status, TransactionStatus::Pending);
        assert!(txn.gateway_ref.starts_with("TXN_"));
        assert_eq!(txn.gateway_ref.len(), 36);
        assert!(txn.refunded_at.is_none());
    }

    #[test]
    fn test_legal_transitions() {
        assert!(TransactionStatus::Pending.can_transition_to(TransactionStatus::Completed));
        assert!(TransactionStatus::Pending.can_transition_to(TransactionStatus::Failed));
        assert!(TransactionStatus::Completed.can_transition_to(TransactionStatus::Refunded));
    }

    #[test]
    fn test_illegal_transitions_leave_record_untouched() {
        let cases = [
            (TransactionStatus::Completed, TransactionStatus::Pending),
            (TransactionStatus::Failed, TransactionStatus::Completed),
            (TransactionStatus::Refunded, TransactionStatus::Completed),
            (TransactionStatus::Pending, TransactionStatus::Refunded),
            (TransactionStatus::Failed, TransactionStatus::Refunded),
            (TransactionStatus::Refunded, TransactionStatus::Refunded),
        ];

        for (from, to) in cases {
            let mut txn = in_status(from);
            let before = txn.clone();
            let later = txn.updated_at + Duration::minutes(5);

            let err = txn.transition_to(to, later).unwrap_err();
            assert!(
                matches!(err, AppError::InvalidTransition { from: f, to: t } if f == from && t == to),
                "{from} -> {to} should be rejected"
            );
            assert_eq!(txn, before, "{from} -> {to} mutated the record");
        }
    }

    #[test]
    fn test_complete_stores_provider_reference() {
        let mut txn = pending();
        txn.complete("CARD_ABC".to_string(), Utc::now()).unwrap();
        assert_eq!(txn.status, TransactionStatus::Completed);
        assert_eq!(txn.gateway_ref, "CARD_ABC");
    }

    #[test]
    fn test_complete_after_failure_keeps_reference() {
        let mut txn = pending();
        txn.fail("declined", Utc::now()).unwrap();
        let before = txn.clone();

        assert!(txn.complete("CARD_LATE".to_string(), Utc::now()).is_err());
        assert_eq!(txn, before);
    }

    #[test]
    fn test_refund_appends_reason_to_payload() {
        let mut txn = pending();
        txn.complete("CARD_1".to_string(), Utc::now()).unwrap();
        let at = Utc::now();
        txn.refund("can no longer attend", at).unwrap();

        assert_eq!(txn.status, TransactionStatus::Refunded);
        assert_eq!(txn.refunded_at, Some(at));
        let payload = txn.payment_data.unwrap();
        assert_eq!(payload["token"], "tok_visa");
        assert_eq!(payload["refund_reason"], "can no longer attend");
        assert!(payload["refund_date"].is_string());
    }

    #[test]
    fn test_annotate_wraps_non_object_payload() {
        let mut txn = pending();
        txn.payment_data = Some(json!(["opaque"]));
        txn.fail("declined", Utc::now()).unwrap();

        let payload = txn.payment_data.unwrap();
        assert_eq!(payload["payload"], json!(["opaque"]));
        assert_eq!(payload["failure_reason"], "declined");
    }

    #[test]
    fn test_redacted_hides_payment_details() {
        let txn = pending().redacted();
        assert!(txn.payment_data.is_none());
        assert_eq!(txn.gateway_ref, REDACTED);
    }
}
