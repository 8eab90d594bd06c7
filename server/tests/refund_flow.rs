mod common;

use std::sync::Arc;
use std::time::Duration;

use agora_ticketing::gateway::scripted::Step;
use agora_ticketing::models::{Actor, Role, TransactionStatus};
use agora_ticketing::store::{Store, StoreTx};
use agora_ticketing::utils::error::AppError;
use common::{buyer, Fixture};
use uuid::Uuid;

#[tokio::test]
async fn test_refund_returns_tickets_and_records_reason() {
    let fx = Fixture::builder().quantity(10).build();
    let alice = buyer();
    let receipt = fx.buy(&alice, 3).await.unwrap();

    let refund = fx
        .engine
        .refund(&alice, receipt.transaction_id, "Can no longer attend")
        .await
        .unwrap();

    assert_eq!(refund.status, TransactionStatus::Refunded);
    assert_eq!(refund.quantity, 3);
    assert_eq!(fx.sold().await, 0);
    assert_eq!(fx.gateway.refund_calls(), 1);

    let txn = fx.transaction(receipt.transaction_id).await;
    assert_eq!(txn.status, TransactionStatus::Refunded);
    assert_eq!(txn.refunded_at, Some(fx.clock_now()));
    let data = txn.payment_data.unwrap();
    assert_eq!(data["refund_reason"], "Can no longer attend");
    assert!(data.get("refund_date").is_some());
}

#[tokio::test]
async fn test_second_refund_is_rejected() {
    let fx = Fixture::new();
    let alice = buyer();
    let receipt = fx.buy(&alice, 2).await.unwrap();
    fx.buy(&buyer(), 1).await.unwrap();

    fx.engine
        .refund(&alice, receipt.transaction_id, "first")
        .await
        .unwrap();
    let err = fx
        .engine
        .refund(&alice, receipt.transaction_id, "second")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotRefundable(_)));
    assert_eq!(fx.sold().await, 1);
    assert_eq!(fx.gateway.refund_calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refunds_release_once() {
    let fx = Arc::new(Fixture::builder().gateway_latency(Duration::from_millis(50)).build());
    let alice = buyer();
    let receipt = fx.buy(&alice, 4).await.unwrap();

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let fx = fx.clone();
            tokio::spawn(async move {
                fx.engine
                    .refund(&alice, receipt.transaction_id, "duplicate click")
                    .await
            })
        })
        .collect();

    let mut refunded = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => refunded += 1,
            Err(err) => assert!(matches!(err, AppError::NotRefundable(_)), "{:?}", err),
        }
    }

    assert_eq!(refunded, 1);
    assert_eq!(fx.sold().await, 0);
    assert_eq!(fx.gateway.refund_calls(), 1);
}

#[tokio::test]
async fn test_declined_refund_changes_nothing() {
    let fx = Fixture::new();
    let alice = buyer();
    let receipt = fx.buy(&alice, 2).await.unwrap();
    fx.gateway
        .push_refund(Step::Decline("refund window closed at issuer".to_string()));

    let err = fx
        .engine
        .refund(&alice, receipt.transaction_id, "changed plans")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::RefundFailed(_)));
    assert_eq!(fx.sold().await, 2);
    let txn = fx.transaction(receipt.transaction_id).await;
    assert_eq!(txn.status, TransactionStatus::Completed);
    assert!(txn.refunded_at.is_none());
}

#[tokio::test]
async fn test_refund_gateway_outage_changes_nothing() {
    let fx = Fixture::new();
    let alice = buyer();
    let receipt = fx.buy(&alice, 2).await.unwrap();
    fx.gateway.push_refund(Step::Unavailable("timeout".to_string()));

    let err = fx
        .engine
        .refund(&alice, receipt.transaction_id, "changed plans")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ExternalServiceError(_)));
    assert_eq!(fx.sold().await, 2);

    // a retry once the gateway is back goes through
    fx.engine
        .refund(&alice, receipt.transaction_id, "changed plans")
        .await
        .unwrap();
    assert_eq!(fx.sold().await, 0);
}

#[tokio::test]
async fn test_only_owner_or_admin_may_refund() {
    let fx = Fixture::new();
    let alice = buyer();
    let receipt = fx.buy(&alice, 1).await.unwrap();

    for actor in [buyer(), fx.organizer] {
        let err = fx
            .engine
            .refund(&actor, receipt.transaction_id, "not mine")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
    assert_eq!(fx.gateway.refund_calls(), 0);

    let admin = Actor::new(Uuid::new_v4(), Role::SuperAdmin);
    fx.engine
        .refund(&admin, receipt.transaction_id, "support ticket 1182")
        .await
        .unwrap();
    assert_eq!(fx.sold().await, 0);
}

#[tokio::test]
async fn test_no_refunds_once_event_started() {
    let fx = Fixture::new();
    let alice = buyer();
    let receipt = fx.buy(&alice, 1).await.unwrap();
    fx.clock.set(fx.event.start_time);

    let err = fx
        .engine
        .refund(&alice, receipt.transaction_id, "too late")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotRefundable(_)));
    assert_eq!(fx.sold().await, 1);
}

#[tokio::test]
async fn test_failed_purchase_is_not_refundable() {
    let fx = Fixture::new();
    let alice = buyer();
    fx.gateway.push_charge(Step::Decline("insufficient funds".to_string()));
    fx.buy(&alice, 1).await.unwrap_err();
    let failed = fx.all_transactions().await.remove(0);

    let err = fx
        .engine
        .refund(&alice, failed.id, "never paid")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotRefundable(_)));
    assert_eq!(fx.sold().await, 0);
}

#[tokio::test]
async fn test_refund_reason_is_required() {
    let fx = Fixture::new();
    let alice = buyer();
    let receipt = fx.buy(&alice, 1).await.unwrap();

    let long = "x".repeat(501);
    for reason in ["", "   ", long.as_str()] {
        let err = fx
            .engine
            .refund(&alice, receipt.transaction_id, reason)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
    assert_eq!(fx.sold().await, 1);
}

#[tokio::test]
async fn test_unknown_transaction_is_not_found() {
    let fx = Fixture::new();
    let err = fx
        .engine
        .refund(&buyer(), Uuid::new_v4(), "ghost")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_refund_on_a_locked_tier_is_busy_before_any_money_moves() {
    let fx = Fixture::builder()
        .lock_timeout(Duration::from_millis(50))
        .build();
    let alice = buyer();
    let receipt = fx.buy(&alice, 3).await.unwrap();

    let mut holder = fx.store.begin().await.unwrap();
    holder.lock_tier(fx.tier.id).await.unwrap();

    let err = fx
        .engine
        .refund(&alice, receipt.transaction_id, "cannot attend")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Busy(_)));
    assert_eq!(fx.gateway.refund_calls(), 0);
    drop(holder);
    assert_eq!(fx.sold().await, 3);
    assert_eq!(
        fx.transaction(receipt.transaction_id).await.status,
        TransactionStatus::Completed
    );

    // once the tier is free the refund goes through exactly once
    fx.engine
        .refund(&alice, receipt.transaction_id, "cannot attend")
        .await
        .unwrap();
    assert_eq!(fx.gateway.refund_calls(), 1);
    assert_eq!(fx.sold().await, 0);
}

#[tokio::test]
async fn test_refund_on_a_locked_transaction_is_busy() {
    let fx = Fixture::builder()
        .lock_timeout(Duration::from_millis(50))
        .build();
    let alice = buyer();
    let receipt = fx.buy(&alice, 1).await.unwrap();

    let mut holder = fx.store.begin().await.unwrap();
    holder.lock_transaction(receipt.transaction_id).await.unwrap();

    let err = fx
        .engine
        .refund(&alice, receipt.transaction_id, "cannot attend")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Busy(_)));
    assert_eq!(fx.gateway.refund_calls(), 0);
    assert_eq!(fx.sold().await, 1);
}
