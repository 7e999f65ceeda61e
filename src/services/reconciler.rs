//! Applies signed payment-gateway callbacks to transactions and bookings.
//!
//! Deliveries are at-least-once and may arrive out of order. A capture is applied inside one
//! session; a delivery that loses a race to a concurrent one either becomes an idempotent hit on
//! retry or is acknowledged once retries run out. Every recognised delivery is acknowledged so
//! the gateway stops retrying.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Notification, NotificationKind, PaymentMethod, Transaction, TxStatus};
use crate::error::AppError;
use crate::ports::{Session, Store};
use crate::services::credit;
use crate::services::effects::{EffectDispatcher, SideEffect};
use crate::services::payments::{apply_success, complete_join};
use crate::services::retry_on_conflict;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 of the raw body.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

pub const SLOT_UNAVAILABLE: &str = "slot_unavailable";
pub const TRANSACTION_ABANDONED: &str = "transaction_abandoned";
pub const CREDIT_UNAVAILABLE: &str = "credit_unavailable";
pub const TRANSACTION_FAILED: &str = "transaction_failed";
pub const ALREADY_PAID: &str = "already_paid";
pub const DUPLICATE_PAYMENT: &str = "duplicate_payment";

#[derive(Debug, Clone, Deserialize)]
pub struct Entity<T> {
    pub entity: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    pub order_id: String,
    pub amount: i64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundEntity {
    pub id: String,
    pub payment_id: String,
    pub amount: i64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentPayload {
    pub payment: Entity<PaymentEntity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundPayload {
    pub refund: Entity<RefundEntity>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event")]
pub enum GatewayEvent {
    #[serde(rename = "payment.captured")]
    PaymentCaptured { payload: PaymentPayload },
    #[serde(rename = "payment.authorized")]
    PaymentAuthorized { payload: PaymentPayload },
    #[serde(rename = "payment.failed")]
    PaymentFailed { payload: PaymentPayload },
    #[serde(rename = "refund.created")]
    RefundCreated { payload: RefundPayload },
    #[serde(rename = "refund.processed")]
    RefundProcessed { payload: RefundPayload },
    #[serde(rename = "refund.failed")]
    RefundFailed { payload: RefundPayload },
    #[serde(other)]
    Unknown,
}

impl GatewayEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GatewayEvent::PaymentCaptured { .. } => "payment.captured",
            GatewayEvent::PaymentAuthorized { .. } => "payment.authorized",
            GatewayEvent::PaymentFailed { .. } => "payment.failed",
            GatewayEvent::RefundCreated { .. } => "refund.created",
            GatewayEvent::RefundProcessed { .. } => "refund.processed",
            GatewayEvent::RefundFailed { .. } => "refund.failed",
            GatewayEvent::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefundStage {
    Created,
    Processed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAck {
    pub success: bool,
    pub message: String,
}

impl WebhookAck {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

enum Capture {
    Applied(Uuid, Vec<SideEffect>),
    Duplicate,
    UnknownOrder,
    /// A different payment arrived for a transaction that is already settled.
    ExtraPayment(TxStatus),
    Unfulfillable(&'static str),
}

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature against the raw body.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

pub struct WebhookReconciler {
    store: Arc<dyn Store>,
    effects: EffectDispatcher,
    secret: String,
}

impl WebhookReconciler {
    pub fn new(store: Arc<dyn Store>, effects: EffectDispatcher, secret: String) -> Self {
        Self {
            store,
            effects,
            secret,
        }
    }

    /// Authenticates and applies one delivery. The signature is checked before the body is parsed.
    pub async fn handle(
        &self,
        body: &[u8],
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<WebhookAck, AppError> {
        let signature = signature
            .ok_or_else(|| AppError::Unauthorized("missing webhook signature".to_string()))?;
        if !verify_signature(&self.secret, body, signature) {
            tracing::warn!(body_len = body.len(), "Webhook signature mismatch");
            return Err(AppError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }

        let event: GatewayEvent = serde_json::from_slice(body)
            .map_err(|e| AppError::BadRequest(format!("malformed webhook body: {}", e)))?;
        tracing::debug!(event = event.name(), "Webhook verified");

        self.apply(event, signature, now).await
    }

    pub async fn apply(
        &self,
        event: GatewayEvent,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<WebhookAck, AppError> {
        match event {
            GatewayEvent::PaymentCaptured { payload } => {
                self.on_success(payload.payment.entity, TxStatus::Captured, signature, now)
                    .await
            }
            GatewayEvent::PaymentAuthorized { payload } => {
                self.on_success(payload.payment.entity, TxStatus::Authorized, signature, now)
                    .await
            }
            GatewayEvent::PaymentFailed { payload } => {
                self.on_failure(payload.payment.entity, now).await
            }
            GatewayEvent::RefundCreated { payload } => {
                self.on_refund(payload.refund.entity, RefundStage::Created, now)
                    .await
            }
            GatewayEvent::RefundProcessed { payload } => {
                self.on_refund(payload.refund.entity, RefundStage::Processed, now)
                    .await
            }
            GatewayEvent::RefundFailed { payload } => {
                self.on_refund(payload.refund.entity, RefundStage::Failed, now)
                    .await
            }
            GatewayEvent::Unknown => {
                tracing::info!("Ignoring unrecognised webhook event");
                Ok(WebhookAck::ok("Event ignored"))
            }
        }
    }

    async fn on_success(
        &self,
        payment: PaymentEntity,
        status: TxStatus,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<WebhookAck, AppError> {
        let outcome = retry_on_conflict("apply_capture", || {
            self.capture(&payment, status, signature, now)
        })
        .await;

        let reason = match outcome {
            Ok(Capture::Applied(transaction_id, effects)) => {
                tracing::info!(
                    %transaction_id,
                    order_id = %payment.order_id,
                    payment_id = %payment.id,
                    status = %status,
                    "Payment applied"
                );
                self.effects.dispatch(effects).await;
                return Ok(WebhookAck::ok("Payment applied"));
            }
            Ok(Capture::Duplicate) => {
                tracing::info!(
                    order_id = %payment.order_id,
                    payment_id = %payment.id,
                    "Duplicate delivery, already applied"
                );
                return Ok(WebhookAck::ok("Already processed"));
            }
            Ok(Capture::UnknownOrder) => {
                tracing::warn!(order_id = %payment.order_id, "No transaction for gateway order");
                return Ok(WebhookAck::ok("Transaction not found"));
            }
            Ok(Capture::ExtraPayment(current)) => {
                tracing::warn!(
                    order_id = %payment.order_id,
                    payment_id = %payment.id,
                    current = %current,
                    "Second payment for a settled transaction"
                );
                retry_on_conflict("return_extra_payment", || {
                    self.return_extra_payment(&payment, signature, now)
                })
                .await?;
                return Ok(WebhookAck::ok(
                    "Payment could not be applied and was returned as credit",
                ));
            }
            Ok(Capture::Unfulfillable(reason)) => reason,
            Err(AppError::SlotConflict(msg)) => {
                tracing::warn!(order_id = %payment.order_id, conflict = %msg, "Paid booking cannot be confirmed");
                SLOT_UNAVAILABLE
            }
            Err(AppError::AlreadyFunded(msg)) => {
                tracing::warn!(order_id = %payment.order_id, conflict = %msg, "Players were already paid for");
                ALREADY_PAID
            }
            Err(e) if e.is_write_conflict() => {
                tracing::error!(
                    order_id = %payment.order_id,
                    payment_id = %payment.id,
                    error = %e,
                    "Capture kept conflicting, acknowledging as handled by a concurrent delivery"
                );
                return Ok(WebhookAck::ok("Already processed"));
            }
            Err(e) => return Err(e),
        };

        retry_on_conflict("compensate_capture", || {
            self.compensate(&payment, signature, reason, now)
        })
        .await?;
        Ok(WebhookAck::ok("Payment could not be applied and was returned as credit"))
    }

    async fn capture(
        &self,
        payment: &PaymentEntity,
        status: TxStatus,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<Capture, AppError> {
        let mut session = self.store.begin().await?;
        let Some(mut txn) = session.transaction_by_order(&payment.order_id).await? else {
            return Ok(Capture::UnknownOrder);
        };

        if is_recorded(&txn, payment) {
            return Ok(Capture::Duplicate);
        }
        if txn.status.is_success() || txn.status == TxStatus::Refunded {
            if is_returned(session.as_mut(), &txn, payment).await? {
                return Ok(Capture::Duplicate);
            }
            return Ok(Capture::ExtraPayment(txn.status));
        }
        match txn.status {
            TxStatus::Abandoned => return Ok(Capture::Unfulfillable(TRANSACTION_ABANDONED)),
            TxStatus::Failed => return Ok(Capture::Unfulfillable(TRANSACTION_FAILED)),
            _ => {}
        }
        if payment.amount != txn.gateway_portion() {
            tracing::warn!(
                transaction_id = %txn.id,
                expected = txn.gateway_portion(),
                received = payment.amount,
                "Captured amount differs from the order amount"
            );
        }

        txn.gateway_payment_id = Some(payment.id.clone());
        txn.gateway_signature = Some(signature.to_string());
        txn.webhook_verified = true;
        txn.paid_at = Some(now);
        txn.transition(status, now)?;

        if txn.method == PaymentMethod::Combined && !txn.credit_deducted {
            match credit::deduct(session.as_mut(), &mut txn).await {
                Ok(_) => {}
                Err(AppError::Validation(msg)) => {
                    tracing::warn!(transaction_id = %txn.id, reason = %msg, "Reserved credit is no longer available");
                    return Ok(Capture::Unfulfillable(CREDIT_UNAVAILABLE));
                }
                Err(e) => return Err(e),
            }
        }

        session.update_transaction(&mut txn).await?;

        let mut effects = Vec::new();
        apply_success(session.as_mut(), &txn, now, &mut effects).await?;
        complete_join(session.as_mut(), &txn, now, &mut effects).await?;
        session.commit().await?;

        Ok(Capture::Applied(txn.id, effects))
    }

    /// Returns money that arrived for an unfulfillable transaction to the payer's stored credit.
    async fn compensate(
        &self,
        payment: &PaymentEntity,
        signature: &str,
        reason: &'static str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut session = self.store.begin().await?;
        let Some(mut txn) = session.transaction_by_order(&payment.order_id).await? else {
            return Ok(());
        };
        if is_recorded(&txn, payment) {
            return Ok(());
        }

        txn.gateway_payment_id = Some(payment.id.clone());
        txn.gateway_signature = Some(signature.to_string());
        txn.webhook_verified = true;
        txn.paid_at = Some(now);
        if !txn.credit_deducted {
            credit::release(&mut txn)?;
        }

        let refund = txn.gateway_portion();
        if refund > 0 {
            session.adjust_credit(txn.user_id, refund).await?;
        }
        txn.mark_compensated(refund, reason, now);
        session.update_transaction(&mut txn).await?;
        session.commit().await?;

        tracing::warn!(
            transaction_id = %txn.id,
            order_id = %payment.order_id,
            payment_id = %payment.id,
            user_id = %txn.user_id,
            credited = refund,
            reason,
            "Captured payment returned as stored credit"
        );

        let mut notification = Notification::new(
            txn.user_id,
            NotificationKind::SlotUnavailable,
            format!(
                "Your booking could not be confirmed; {} {} was added to your credit",
                refund, txn.currency
            ),
        )
        .for_transaction(txn.id);
        if let Some(booking_id) = txn.booking_ids.first() {
            notification = notification.for_booking(*booking_id);
        }
        self.effects
            .dispatch(vec![SideEffect::Notify(notification)])
            .await;
        Ok(())
    }

    /// Returns a second payment on an already settled order to the payer's stored credit as its
    /// own ledger entry. The settled transaction is left as it is.
    async fn return_extra_payment(
        &self,
        payment: &PaymentEntity,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut session = self.store.begin().await?;
        let Some(source) = session.transaction_by_order(&payment.order_id).await? else {
            return Ok(());
        };
        if is_returned(session.as_mut(), &source, payment).await? {
            return Ok(());
        }

        let mut entry = Transaction::returned_payment_entry(
            &source,
            &payment.id,
            payment.amount,
            DUPLICATE_PAYMENT,
            now,
        );
        entry.gateway_signature = Some(signature.to_string());
        if payment.amount > 0 {
            session.adjust_credit(source.user_id, payment.amount).await?;
        }
        session.insert_transaction(&entry).await?;
        session.commit().await?;

        tracing::warn!(
            transaction_id = %source.id,
            ledger_transaction_id = %entry.id,
            payment_id = %payment.id,
            user_id = %source.user_id,
            credited = payment.amount,
            "Second payment returned as stored credit"
        );

        let mut notification = Notification::new(
            source.user_id,
            NotificationKind::SlotUnavailable,
            format!(
                "A second payment of {} {} was added to your credit",
                payment.amount, source.currency
            ),
        )
        .for_transaction(entry.id);
        if let Some(booking_id) = source.booking_ids.first() {
            notification = notification.for_booking(*booking_id);
        }
        self.effects
            .dispatch(vec![SideEffect::Notify(notification)])
            .await;
        Ok(())
    }

    async fn on_failure(
        &self,
        payment: PaymentEntity,
        now: DateTime<Utc>,
    ) -> Result<WebhookAck, AppError> {
        let outcome = retry_on_conflict("apply_failure", || self.record_failure(&payment, now)).await;

        match outcome {
            Ok(Some(effects)) => {
                self.effects.dispatch(effects).await;
                Ok(WebhookAck::ok("Payment failure recorded"))
            }
            Ok(None) => Ok(WebhookAck::ok("Already processed")),
            Err(e) if e.is_write_conflict() => {
                tracing::error!(order_id = %payment.order_id, error = %e, "Failure event kept conflicting");
                Ok(WebhookAck::ok("Already processed"))
            }
            Err(e) => Err(e),
        }
    }

    async fn record_failure(
        &self,
        payment: &PaymentEntity,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<SideEffect>>, AppError> {
        let mut session = self.store.begin().await?;
        let Some(mut txn) = session.transaction_by_order(&payment.order_id).await? else {
            tracing::warn!(order_id = %payment.order_id, "No transaction for failed gateway order");
            return Ok(None);
        };

        match txn.status {
            TxStatus::Created => txn.transition(TxStatus::Failed, now)?,
            TxStatus::Failed if txn.gateway_payment_id.as_deref() != Some(payment.id.as_str()) => {
                txn.updated_at = now;
            }
            current => {
                tracing::info!(
                    transaction_id = %txn.id,
                    current = %current,
                    payment_id = %payment.id,
                    "Failure event ignored"
                );
                return Ok(None);
            }
        }

        let reason = payment
            .error_description
            .clone()
            .unwrap_or_else(|| "payment_failed".to_string());
        txn.failure_reason = Some(reason.clone());
        txn.gateway_payment_id = Some(payment.id.clone());
        session.update_transaction(&mut txn).await?;

        let effects = notify_parties(
            session.as_mut(),
            &txn,
            NotificationKind::PaymentFailed,
            format!("Payment of {} {} failed: {}", txn.amount, txn.currency, reason),
        )
        .await?;
        session.commit().await?;

        tracing::info!(
            transaction_id = %txn.id,
            order_id = %payment.order_id,
            reason = %reason,
            "Payment failure recorded"
        );
        Ok(Some(effects))
    }

    async fn on_refund(
        &self,
        refund: RefundEntity,
        stage: RefundStage,
        now: DateTime<Utc>,
    ) -> Result<WebhookAck, AppError> {
        let outcome =
            retry_on_conflict("apply_refund", || self.record_refund(&refund, stage, now)).await;

        match outcome {
            Ok(Some(effects)) => {
                self.effects.dispatch(effects).await;
                Ok(WebhookAck::ok("Refund recorded"))
            }
            Ok(None) => Ok(WebhookAck::ok("Already processed")),
            Err(e) if e.is_write_conflict() => {
                tracing::error!(refund_id = %refund.id, error = %e, "Refund event kept conflicting");
                Ok(WebhookAck::ok("Already processed"))
            }
            Err(e) => Err(e),
        }
    }

    async fn record_refund(
        &self,
        refund: &RefundEntity,
        stage: RefundStage,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<SideEffect>>, AppError> {
        let mut session = self.store.begin().await?;
        let Some(mut txn) = session.transaction_by_payment(&refund.payment_id).await? else {
            tracing::warn!(
                refund_id = %refund.id,
                payment_id = %refund.payment_id,
                "No transaction for refunded payment"
            );
            return Ok(None);
        };

        let same_refund = txn.refund_id.as_deref() == Some(refund.id.as_str());
        let mut effects = Vec::new();
        match stage {
            RefundStage::Created => {
                if same_refund {
                    return Ok(None);
                }
                txn.refund_id = Some(refund.id.clone());
                txn.refunded_amount = refund.amount;
                txn.updated_at = now;
            }
            RefundStage::Processed => {
                if same_refund && txn.status == TxStatus::Refunded {
                    return Ok(None);
                }
                txn.refund_id = Some(refund.id.clone());
                txn.refunded_amount = refund.amount;
                if txn.status.is_success() {
                    txn.transition(TxStatus::Refunded, now)?;
                } else {
                    txn.updated_at = now;
                }
                effects = notify_parties(
                    session.as_mut(),
                    &txn,
                    NotificationKind::RefundProcessed,
                    format!("A refund of {} {} was processed", refund.amount, txn.currency),
                )
                .await?;
            }
            RefundStage::Failed => {
                let reason = format!(
                    "refund_failed: {}",
                    refund.error_description.as_deref().unwrap_or("unknown")
                );
                if same_refund && txn.failure_reason.as_deref() == Some(reason.as_str()) {
                    return Ok(None);
                }
                tracing::warn!(
                    transaction_id = %txn.id,
                    refund_id = %refund.id,
                    reason = %reason,
                    "Gateway refund failed"
                );
                txn.refund_id = Some(refund.id.clone());
                txn.failure_reason = Some(reason);
                txn.updated_at = now;
            }
        }

        session.update_transaction(&mut txn).await?;
        session.commit().await?;

        tracing::info!(
            transaction_id = %txn.id,
            refund_id = %refund.id,
            stage = ?stage,
            amount = refund.amount,
            "Refund event recorded"
        );
        Ok(Some(effects))
    }
}

fn is_recorded(txn: &Transaction, payment: &PaymentEntity) -> bool {
    txn.webhook_verified && txn.gateway_payment_id.as_deref() == Some(payment.id.as_str())
}

/// Whether `payment` was already returned as credit against `txn`.
async fn is_returned(
    session: &mut dyn Session,
    txn: &Transaction,
    payment: &PaymentEntity,
) -> Result<bool, AppError> {
    Ok(session
        .transaction_by_payment(&payment.id)
        .await?
        .is_some_and(|entry| entry.notes.refund_of == Some(txn.id)))
}

/// Notifies the owner of every linked booking, and the payer when they are someone else.
async fn notify_parties(
    session: &mut dyn Session,
    txn: &Transaction,
    kind: NotificationKind,
    body: String,
) -> Result<Vec<SideEffect>, AppError> {
    let mut recipients = Vec::new();
    for booking_id in &txn.booking_ids {
        if let Some(booking) = session.booking(*booking_id).await? {
            if !recipients.contains(&(booking.owner_id, booking.id)) {
                recipients.push((booking.owner_id, booking.id));
            }
        }
    }

    let mut effects: Vec<SideEffect> = recipients
        .iter()
        .map(|(owner, booking_id)| {
            SideEffect::Notify(
                Notification::new(*owner, kind, body.clone())
                    .for_booking(*booking_id)
                    .for_transaction(txn.id),
            )
        })
        .collect();
    if !recipients.iter().any(|(owner, _)| *owner == txn.user_id) {
        effects.push(SideEffect::Notify(
            Notification::new(txn.user_id, kind, body).for_transaction(txn.id),
        ));
    }
    Ok(effects)
}
