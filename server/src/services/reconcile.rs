//! Sweep for purchases whose gateway outcome never arrived.
//!
//! A crash between reserving and finalizing leaves a `pending` row holding
//! tickets. Once such a row is older than the grace period it is failed and
//! its tickets returned, through the same locked path the purchase flow uses.

use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::Engine;
use crate::utils::error::AppError;

pub const ABANDONED_REASON: &str = "payment outcome unknown; reservation expired";
const SWEEP_BATCH: i64 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub released: usize,
    pub errors: usize,
}

impl Engine {
    pub async fn reconcile_stale(&self) -> Result<ReconcileReport, AppError> {
        let grace = chrono::Duration::from_std(self.policy.pending_grace)
            .map_err(|_| AppError::ConfigError("pending grace period is out of range".to_string()))?;
        let cutoff = self.clock.now() - grace;

        let stale = self.store.stale_pending(cutoff, SWEEP_BATCH).await?;
        let mut report = ReconcileReport {
            scanned: stale.len(),
            ..ReconcileReport::default()
        };

        for id in stale {
            match self.fail_and_release(id, ABANDONED_REASON).await {
                Ok(true) => {
                    report.released += 1;
                    warn!(transaction_id = %id, "Released abandoned reservation");
                }
                Ok(false) => {}
                Err(err) => {
                    report.errors += 1;
                    error!(transaction_id = %id, error = %err, "Could not reconcile pending transaction");
                }
            }
        }

        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                released = report.released,
                errors = report.errors,
                "Reconciliation sweep finished"
            );
        }
        Ok(report)
    }
}

/// Runs [`Engine::reconcile_stale`] every `every` until the task is aborted.
pub fn spawn_reconciler(engine: Engine, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = engine.reconcile_stale().await {
                error!(error = %err, "Reconciliation sweep failed");
            }
        }
    })
}
