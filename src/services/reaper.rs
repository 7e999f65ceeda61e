//! Releases credit held by combined payments that never completed.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{PaymentMethod, TxStatus};
use crate::error::AppError;
use crate::ports::Store;
use crate::services::credit;

pub const DEFAULT_STALE_AFTER_SECS: i64 = 3600;
const SWEEP_BATCH: i64 = 100;

pub struct Reaper {
    store: Arc<dyn Store>,
    stale_after: Duration,
}

impl Reaper {
    pub fn new(store: Arc<dyn Store>, stale_after: Duration) -> Self {
        Self { store, stale_after }
    }

    /// Abandons stale `created` combined transactions. Returns how many were abandoned.
    ///
    /// Each transaction is reloaded and updated in its own session, so overlapping sweeps only
    /// abandon a transaction once.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let cutoff = now - self.stale_after;
        let stale = {
            let mut session = self.store.begin().await?;
            session
                .stale_transactions(PaymentMethod::Combined, cutoff, SWEEP_BATCH)
                .await?
        };

        let scanned = stale.len();
        let mut abandoned = 0;
        for txn in stale {
            match self.abandon(txn.id, now).await {
                Ok(true) => abandoned += 1,
                Ok(false) => {}
                Err(e) if e.is_write_conflict() => {
                    tracing::debug!(transaction_id = %txn.id, "Transaction changed during sweep, skipped");
                }
                Err(e) => {
                    tracing::error!(transaction_id = %txn.id, error = %e, "Failed to abandon transaction");
                }
            }
        }

        if scanned > 0 {
            tracing::info!(scanned, abandoned, cutoff = %cutoff, "Reaper sweep finished");
        } else {
            tracing::debug!(cutoff = %cutoff, "Reaper sweep found nothing stale");
        }
        Ok(abandoned)
    }

    async fn abandon(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
        let mut session = self.store.begin().await?;
        let Some(mut txn) = session.transaction(id).await? else {
            return Ok(false);
        };
        if txn.status != TxStatus::Created {
            return Ok(false);
        }

        credit::release(&mut txn)?;
        txn.transition(TxStatus::Abandoned, now)?;
        session.update_transaction(&mut txn).await?;
        session.commit().await?;

        tracing::info!(
            transaction_id = %txn.id,
            user_id = %txn.user_id,
            released = txn.credit_used,
            "Abandoned stale reservation"
        );
        Ok(true)
    }

    /// Sweeps on every tick of `schedule` until the schedule runs out.
    pub async fn run_schedule(self: Arc<Self>, schedule: cron::Schedule) {
        tracing::info!("Reaper loop started");
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                tracing::warn!("Reaper schedule has no upcoming runs, stopping");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            if let Err(e) = self.sweep(Utc::now()).await {
                tracing::error!(error = %e, "Reaper sweep failed");
            }
        }
    }
}
