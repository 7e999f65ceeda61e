//! Stored-credit reservations.
//!
//! A reservation is a logical hold recorded on the transaction; the balance only moves on
//! `deduct`. These functions run inside the caller's session so that credit state commits
//! together with the transaction and booking writes that depend on it.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{CreditSummary, Notification, NotificationKind, Transaction};
use crate::error::AppError;
use crate::ports::{Session, Store};
use crate::services::effects::{EffectDispatcher, SideEffect};

pub async fn summary(session: &mut dyn Session, user_id: Uuid) -> Result<CreditSummary, AppError> {
    let account = session.credit_account(user_id).await?;
    let held = session.held_credit(user_id).await?;
    Ok(CreditSummary::new(account.balance, held))
}

/// Holds `amount` of the owner's credit for `txn`. The caller persists `txn`.
pub async fn reserve(
    session: &mut dyn Session,
    txn: &mut Transaction,
    amount: i64,
) -> Result<(), AppError> {
    if amount <= 0 {
        return Err(AppError::Validation(
            "credit amount must be greater than zero".to_string(),
        ));
    }
    if txn.credit_reserved {
        return Err(AppError::Internal(format!(
            "transaction {} already holds a credit reservation",
            txn.id
        )));
    }

    let available = summary(session, txn.user_id).await?.available;
    if amount > available {
        return Err(AppError::Validation(format!(
            "insufficient credit: available {}, requested {}",
            available, amount
        )));
    }

    txn.credit_reserved = true;
    txn.credit_used = amount;
    tracing::debug!(transaction_id = %txn.id, amount, "Credit reserved");
    Ok(())
}

/// Turns the hold into a balance decrement. Returns `false` when already deducted.
pub async fn deduct(session: &mut dyn Session, txn: &mut Transaction) -> Result<bool, AppError> {
    if txn.credit_deducted {
        return Ok(false);
    }
    if !txn.credit_reserved {
        return Err(AppError::Internal(format!(
            "transaction {} has no credit reservation to deduct",
            txn.id
        )));
    }
    if !txn.status.is_success() {
        return Err(AppError::Internal(format!(
            "transaction {} is {}, credit is only deducted on success",
            txn.id, txn.status
        )));
    }

    session.adjust_credit(txn.user_id, -txn.credit_used).await?;
    txn.credit_deducted = true;
    tracing::info!(
        transaction_id = %txn.id,
        user_id = %txn.user_id,
        amount = txn.credit_used,
        "Credit deducted"
    );
    Ok(true)
}

/// Drops the hold. Returns `false` when there was nothing to release.
pub fn release(txn: &mut Transaction) -> Result<bool, AppError> {
    if txn.credit_deducted {
        return Err(AppError::Internal(format!(
            "transaction {} already deducted its credit; refunds go through an explicit credit",
            txn.id
        )));
    }
    if !txn.credit_reserved {
        return Ok(false);
    }

    txn.credit_reserved = false;
    tracing::debug!(transaction_id = %txn.id, amount = txn.credit_used, "Credit hold released");
    Ok(true)
}

/// Read and grant operations on credit accounts.
pub struct CreditLedger {
    store: Arc<dyn Store>,
    effects: EffectDispatcher,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn Store>, effects: EffectDispatcher) -> Self {
        Self { store, effects }
    }

    pub async fn summary(&self, user_id: Uuid) -> Result<CreditSummary, AppError> {
        let mut session = self.store.begin().await?;
        summary(session.as_mut(), user_id).await
    }

    /// Adds credit to a user's balance outside any booking flow.
    pub async fn grant(
        &self,
        user_id: Uuid,
        amount: i64,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<CreditSummary, AppError> {
        let mut session = self.store.begin().await?;
        session.adjust_credit(user_id, amount).await?;
        let summary = summary(session.as_mut(), user_id).await?;
        session.commit().await?;

        tracing::info!(%user_id, amount, note, at = %now, "Credit granted");
        self.effects
            .dispatch(vec![SideEffect::Notify(Notification::new(
                user_id,
                NotificationKind::CreditGranted,
                format!("{} credit added to your balance: {}", amount, note),
            ))])
            .await;

        Ok(summary)
    }
}
