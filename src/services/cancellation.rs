//! Administrative cancellation with pro-rated credit compensation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{BookingKind, Notification, NotificationKind, Transaction, TxStatus};
use crate::error::AppError;
use crate::ports::Store;
use crate::services::effects::{EffectDispatcher, SideEffect};
use crate::services::retry_on_conflict;
use crate::validation::{validate_percentage, validate_reason};

#[derive(Debug, Clone, Deserialize)]
pub struct CancelBooking {
    #[serde(skip)]
    pub booking_id: Uuid,
    pub refund_percentage: i64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundLine {
    pub transaction_id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub credited: i64,
    pub ledger_transaction_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancellationSummary {
    pub booking_id: Uuid,
    pub refund_percentage: i64,
    pub reason: String,
    pub total_credited: i64,
    pub refunds: Vec<RefundLine>,
}

/// `floor(amount * percentage / 100)` for non-negative inputs.
pub fn prorate(amount: i64, percentage: i64) -> i64 {
    amount.saturating_mul(percentage) / 100
}

pub struct CancellationService {
    store: Arc<dyn Store>,
    effects: EffectDispatcher,
}

impl CancellationService {
    pub fn new(store: Arc<dyn Store>, effects: EffectDispatcher) -> Self {
        Self { store, effects }
    }

    /// Compensates every funding transaction and marks the booking cancelled, all in one session.
    pub async fn cancel(
        &self,
        request: CancelBooking,
        now: DateTime<Utc>,
    ) -> Result<CancellationSummary, AppError> {
        validate_percentage("refund_percentage", request.refund_percentage)?;
        let reason = validate_reason(&request.reason)?;

        let (summary, effects) = retry_on_conflict("cancel_booking", || {
            self.try_cancel(request.booking_id, request.refund_percentage, &reason, now)
        })
        .await?;

        tracing::info!(
            booking_id = %summary.booking_id,
            refund_percentage = summary.refund_percentage,
            total_credited = summary.total_credited,
            funding_transactions = summary.refunds.len(),
            "Booking cancelled"
        );
        self.effects.dispatch(effects).await;
        Ok(summary)
    }

    async fn try_cancel(
        &self,
        booking_id: Uuid,
        percentage: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(CancellationSummary, Vec<SideEffect>), AppError> {
        let mut session = self.store.begin().await?;
        let mut booking = session
            .booking(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking {} not found", booking_id)))?;
        if booking.kind == BookingKind::Cancelled {
            return Err(AppError::Validation(format!(
                "booking {} is already cancelled",
                booking_id
            )));
        }

        let mut refunds = Vec::new();
        let mut effects = Vec::new();
        for transaction_id in booking.roster.funding_transactions() {
            let Some(mut txn) = session.transaction(transaction_id).await? else {
                tracing::warn!(%booking_id, %transaction_id, "Funding transaction missing, skipped");
                continue;
            };

            let credited = prorate(txn.amount, percentage);
            if credited > 0 {
                session.adjust_credit(txn.user_id, credited).await?;
            }
            let entry = Transaction::refund_entry(
                &txn,
                booking.id,
                credited,
                prorate(txn.credit_used, percentage),
                now,
            );
            session.insert_transaction(&entry).await?;

            if txn.status.is_success() {
                txn.transition(TxStatus::Refunded, now)?;
                txn.refunded_amount = credited;
                session.update_transaction(&mut txn).await?;
            }

            effects.push(SideEffect::Notify(
                Notification::new(
                    txn.user_id,
                    NotificationKind::BookingCancelled,
                    format!(
                        "Your booking on {} was cancelled ({}). {}% refund: {} {} added to your credit",
                        booking.date, reason, percentage, credited, txn.currency
                    ),
                )
                .for_booking(booking.id)
                .for_transaction(entry.id),
            ));
            refunds.push(RefundLine {
                transaction_id: txn.id,
                user_id: txn.user_id,
                amount: txn.amount,
                credited,
                ledger_transaction_id: entry.id,
            });
        }

        if !refunds.iter().any(|line| line.user_id == booking.owner_id) {
            effects.push(SideEffect::Notify(
                Notification::new(
                    booking.owner_id,
                    NotificationKind::BookingCancelled,
                    format!("Your booking on {} was cancelled ({})", booking.date, reason),
                )
                .for_booking(booking.id),
            ));
        }

        let total_credited = refunds.iter().map(|line| line.credited).sum();
        booking.kind = BookingKind::Cancelled;
        booking.cancellation_reason = Some(reason.to_string());
        booking.refunded_credit = total_credited;
        booking.updated_at = now;
        session.update_booking(&mut booking).await?;
        session.commit().await?;

        Ok((
            CancellationSummary {
                booking_id: booking.id,
                refund_percentage: percentage,
                reason: reason.to_string(),
                total_credited,
                refunds,
            },
            effects,
        ))
    }
}
