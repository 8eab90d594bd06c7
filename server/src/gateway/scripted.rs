//! Deterministic gateway for failure injection.
//!
//! Outcomes are queued per operation and consumed in order; once a queue is
//! empty every call is approved.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::{provider_ref, ChargeOutcome, GatewayError, PaymentGateway, RefundOutcome};
use crate::models::PurchaseTransaction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Approve,
    Decline(String),
    Unavailable(String),
    /// Never answers; exercises the caller's timeout.
    Stall,
}

pub struct ScriptedGateway {
    name: String,
    latency: Duration,
    charges: Mutex<VecDeque<Step>>,
    refunds: Mutex<VecDeque<Step>>,
    charge_calls: AtomicUsize,
    refund_calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latency: Duration::ZERO,
            charges: Mutex::new(VecDeque::new()),
            refunds: Mutex::new(VecDeque::new()),
            charge_calls: AtomicUsize::new(0),
            refund_calls: AtomicUsize::new(0),
        }
    }

    /// Delay applied to every call, so concurrent purchases overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push_charge(&self, step: Step) -> &Self {
        self.charges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(step);
        self
    }

    pub fn push_refund(&self, step: Step) -> &Self {
        self.refunds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(step);
        self
    }

    pub fn charge_calls(&self) -> usize {
        self.charge_calls.load(Ordering::SeqCst)
    }

    pub fn refund_calls(&self) -> usize {
        self.refund_calls.load(Ordering::SeqCst)
    }

    async fn next(&self, queue: &Mutex<VecDeque<Step>>) -> Result<Option<String>, GatewayError> {
        let step = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(Step::Approve);

        tokio::time::sleep(self.latency).await;

        match step {
            Step::Approve => Ok(None),
            Step::Decline(reason) => Ok(Some(reason)),
            Step::Unavailable(message) => Err(GatewayError::Unavailable(message)),
            Step::Stall => {
                std::future::pending::<()>().await;
                Err(GatewayError::Timeout)
            }
        }
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn charge(&self, _txn: &PurchaseTransaction) -> Result<ChargeOutcome, GatewayError> {
        self.charge_calls.fetch_add(1, Ordering::SeqCst);
        Ok(match self.next(&self.charges).await? {
            None => ChargeOutcome::Succeeded {
                provider_ref: provider_ref("SCRIPTED"),
            },
            Some(reason) => ChargeOutcome::Failed { reason },
        })
    }

    async fn refund(
        &self,
        _txn: &PurchaseTransaction,
        _reason: &str,
    ) -> Result<RefundOutcome, GatewayError> {
        self.refund_calls.fetch_add(1, Ordering::SeqCst);
        Ok(match self.next(&self.refunds).await? {
            None => RefundOutcome::Succeeded,
            Some(reason) => RefundOutcome::Failed { reason },
        })
    }
}
