//! Payment initiation and the success effects shared by every settlement path.

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::booking::{MAX_PLAYERS_PER_TEAM, MAX_ROSTER_SIZE};
use crate::domain::{
    format_slots, Booking, BookingKind, JoinTarget, Notification, NotificationKind, Occupant,
    PaymentMethod, PlayerPaymentStatus, PlayerSlot, RequestStatus, Transaction, TxStatus,
};
use crate::error::AppError;
use crate::ports::{GatewayOrder, GatewayRefund, PaymentGateway, Session, Store};
use crate::services::credit;
use crate::services::effects::{EffectDispatcher, SideEffect};
use crate::services::retry_on_conflict;

#[derive(Debug, Clone, Deserialize)]
pub struct InitiatePayment {
    #[serde(skip)]
    pub booking_id: Uuid,
    #[serde(skip)]
    pub payer_id: Uuid,
    pub method: PaymentMethod,
    #[serde(default)]
    pub credit_amount: Option<i64>,
    #[serde(default)]
    pub paid_for: Vec<Uuid>,
    #[serde(default)]
    pub join: Option<JoinTarget>,
}

#[derive(Debug, Serialize)]
pub struct PaymentIntent {
    pub transaction: Transaction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<GatewayOrder>,
}

#[derive(Debug)]
struct PaymentPlan {
    amount: i64,
    credit: i64,
    paid_for: Vec<Uuid>,
}

/// Seat price for a player joining an existing booking: the court price split across a full roster.
pub fn join_share(booking: &Booking) -> i64 {
    let seats = MAX_ROSTER_SIZE as i64;
    (booking.amount + seats - 1) / seats
}

pub struct PaymentService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    effects: EffectDispatcher,
    currency: String,
    /// How long an unfinished payment blocks another one for the same players.
    pending_window: Duration,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        effects: EffectDispatcher,
        currency: String,
        pending_window: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            effects,
            currency,
            pending_window,
        }
    }

    /// Starts a payment for a booking.
    ///
    /// Credit-only payments settle immediately. Gateway and combined payments open a gateway
    /// order first and stay `created` until the webhook arrives.
    pub async fn initiate(
        &self,
        request: InitiatePayment,
        now: DateTime<Utc>,
    ) -> Result<PaymentIntent, AppError> {
        let plan = self.plan(&request, now).await?;

        let mut txn = Transaction::new(
            request.payer_id,
            vec![request.booking_id],
            plan.paid_for.clone(),
            plan.amount,
            self.currency.clone(),
            request.method,
            now,
        );
        txn.notes.join = request.join;

        let order = match request.method {
            PaymentMethod::Gateway | PaymentMethod::Combined => {
                let order = self
                    .gateway
                    .create_order(plan.amount - plan.credit, &self.currency, &txn.id.to_string())
                    .await?;
                txn.gateway_order_id = Some(order.id.clone());
                Some(order)
            }
            PaymentMethod::Credit | PaymentMethod::InPerson => None,
        };

        let (txn, effects) = retry_on_conflict("initiate_payment", || {
            self.record(&request, txn.clone(), plan.credit, now)
        })
        .await?;

        tracing::info!(
            transaction_id = %txn.id,
            booking_id = %request.booking_id,
            method = txn.method.as_str(),
            status = %txn.status,
            amount = txn.amount,
            credit_used = txn.credit_used,
            order_id = ?txn.gateway_order_id,
            "Payment initiated"
        );
        self.effects.dispatch(effects).await;

        Ok(PaymentIntent {
            transaction: txn,
            order,
        })
    }

    /// Read-only checks done before any gateway call.
    async fn plan(
        &self,
        request: &InitiatePayment,
        now: DateTime<Utc>,
    ) -> Result<PaymentPlan, AppError> {
        let mut session = self.store.begin().await?;
        let booking = load_payable(session.as_mut(), request).await?;

        let (amount, paid_for) = match request.join {
            Some(target) => {
                if !booking.paid {
                    return Err(AppError::Validation(format!(
                        "booking {} is not confirmed yet",
                        booking.id
                    )));
                }
                if booking.roster.contains_player(request.payer_id) {
                    return Err(AppError::Validation(
                        "player is already on this booking".to_string(),
                    ));
                }
                let requests = session.booking_requests_for(booking.id).await?;
                if !requests.iter().any(|r| {
                    r.status.is_open() && r.targets(request.payer_id, target.team, target.position)
                }) {
                    return Err(AppError::Validation(format!(
                        "no open join request for {}/{}",
                        target.team, target.position
                    )));
                }
                (join_share(&booking), vec![request.payer_id])
            }
            None => {
                if request.payer_id != booking.owner_id
                    && !booking.roster.contains_player(request.payer_id)
                {
                    return Err(AppError::Validation(
                        "payer is not part of this booking".to_string(),
                    ));
                }
                let paid_for = if request.paid_for.is_empty() {
                    booking.roster.players()
                } else {
                    if let Some(stranger) = request
                        .paid_for
                        .iter()
                        .find(|id| !booking.roster.contains_player(**id))
                    {
                        return Err(AppError::Validation(format!(
                            "player {} is not on the roster",
                            stranger
                        )));
                    }
                    request.paid_for.clone()
                };
                self.ensure_no_pending(session.as_mut(), &booking, &paid_for, now)
                    .await?;
                (booking.amount, paid_for)
            }
        };

        let credit = match request.method {
            PaymentMethod::Credit => amount,
            PaymentMethod::Combined => {
                let credit = request.credit_amount.ok_or_else(|| {
                    AppError::Validation("credit_amount is required for combined payments".to_string())
                })?;
                if credit <= 0 || credit >= amount {
                    return Err(AppError::Validation(format!(
                        "credit_amount must be between 1 and {}",
                        amount - 1
                    )));
                }
                credit
            }
            PaymentMethod::Gateway | PaymentMethod::InPerson => {
                if request.credit_amount.unwrap_or(0) != 0 {
                    return Err(AppError::Validation(format!(
                        "credit_amount is not accepted for {} payments",
                        request.method.as_str()
                    )));
                }
                0
            }
        };

        if credit > 0 {
            let available = credit::summary(session.as_mut(), request.payer_id)
                .await?
                .available;
            if credit > available {
                return Err(AppError::Validation(format!(
                    "insufficient credit: available {}, requested {}",
                    available, credit
                )));
            }
        }

        Ok(PaymentPlan {
            amount,
            credit,
            paid_for,
        })
    }

    /// Refuses a second payment while a recent `created` one already covers any of the same
    /// players. Pending payments older than the window no longer block.
    async fn ensure_no_pending(
        &self,
        session: &mut dyn Session,
        booking: &Booking,
        paid_for: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let cutoff = now - self.pending_window;
        let pending = session.pending_transactions_for(booking.id).await?;
        if let Some(open) = pending.iter().find(|txn| {
            txn.notes.join.is_none()
                && txn.created_at >= cutoff
                && txn.paid_for.iter().any(|player| paid_for.contains(player))
        }) {
            return Err(AppError::Validation(format!(
                "payment {} for booking {} is still pending",
                open.id, booking.id
            )));
        }
        Ok(())
    }

    async fn record(
        &self,
        request: &InitiatePayment,
        mut txn: Transaction,
        credit_amount: i64,
        now: DateTime<Utc>,
    ) -> Result<(Transaction, Vec<SideEffect>), AppError> {
        let mut session = self.store.begin().await?;
        let mut effects = Vec::new();
        let booking = load_payable(session.as_mut(), request).await?;
        if request.join.is_none() {
            self.ensure_no_pending(session.as_mut(), &booking, &txn.paid_for, now)
                .await?;
        }

        if credit_amount > 0 {
            credit::reserve(session.as_mut(), &mut txn, credit_amount).await?;
        }

        if let Some(target) = request.join {
            let mut open = session
                .booking_requests_for(request.booking_id)
                .await?
                .into_iter()
                .find(|r| r.status.is_open() && r.targets(txn.user_id, target.team, target.position))
                .ok_or_else(|| AppError::Validation("join request is no longer open".to_string()))?;
            open.transaction_id = Some(txn.id);
            open.updated_at = now;
            session.update_booking_request(&mut open).await?;
        }

        if txn.method == PaymentMethod::Credit {
            txn.transition(TxStatus::Captured, now)?;
            txn.paid_at = Some(now);
            credit::deduct(session.as_mut(), &mut txn).await?;
            session.insert_transaction(&txn).await?;
            apply_success(session.as_mut(), &txn, now, &mut effects).await?;
            complete_join(session.as_mut(), &txn, now, &mut effects).await?;
        } else {
            session.insert_transaction(&txn).await?;
        }

        session.commit().await?;
        Ok((txn, effects))
    }

    pub async fn get_transaction(&self, id: Uuid, caller: Uuid) -> Result<Transaction, AppError> {
        let mut session = self.store.begin().await?;
        session
            .transaction(id)
            .await?
            .filter(|txn| txn.user_id == caller)
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id)))
    }

    /// Asks the gateway to return money for a captured payment. The outcome arrives later
    /// through `refund.*` webhooks.
    pub async fn request_gateway_refund(
        &self,
        transaction_id: Uuid,
        amount: Option<i64>,
    ) -> Result<GatewayRefund, AppError> {
        let txn = {
            let mut session = self.store.begin().await?;
            session
                .transaction(transaction_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", transaction_id)))?
        };

        if !(txn.status.is_success() || txn.status == TxStatus::Refunded) {
            return Err(AppError::Validation(format!(
                "transaction {} is {}, nothing to refund",
                txn.id, txn.status
            )));
        }
        let payment_id = txn.gateway_payment_id.as_deref().ok_or_else(|| {
            AppError::Validation(format!("transaction {} has no gateway payment", txn.id))
        })?;

        let refundable = txn.gateway_portion();
        let amount = amount.unwrap_or(refundable);
        if amount <= 0 || amount > refundable {
            return Err(AppError::Validation(format!(
                "refund amount must be between 1 and {}",
                refundable
            )));
        }

        let refund = self.gateway.create_refund(payment_id, amount).await?;
        tracing::info!(
            transaction_id = %txn.id,
            refund_id = %refund.id,
            amount,
            "Gateway refund requested"
        );
        Ok(refund)
    }
}

async fn load_payable(
    session: &mut dyn Session,
    request: &InitiatePayment,
) -> Result<Booking, AppError> {
    let booking = session
        .booking(request.booking_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Booking {} not found", request.booking_id)))?;

    if booking.kind == BookingKind::Cancelled {
        return Err(AppError::Validation(format!(
            "booking {} is cancelled",
            booking.id
        )));
    }
    if request.join.is_none() && booking.paid {
        return Err(AppError::Validation(format!(
            "booking {} is already paid",
            booking.id
        )));
    }
    Ok(booking)
}

/// Marks every linked booking paid, assigns its invoice number once, records the funding
/// transaction on the paid-for roster entries and queues chat and notification effects.
/// A join payment only pays for the joiner's seat and never confirms a booking.
///
/// Fails with [`AppError::SlotConflict`] when a linked booking can no longer be confirmed, and
/// with [`AppError::AlreadyFunded`] when the paid-for players were already paid for by
/// another transaction.
pub(crate) async fn apply_success(
    session: &mut dyn Session,
    txn: &Transaction,
    now: DateTime<Utc>,
    effects: &mut Vec<SideEffect>,
) -> Result<(), AppError> {
    for booking_id in &txn.booking_ids {
        let Some(mut booking) = session.booking(*booking_id).await? else {
            tracing::warn!(transaction_id = %txn.id, %booking_id, "Paid booking no longer exists");
            continue;
        };
        if booking.kind == BookingKind::Cancelled {
            return Err(AppError::SlotConflict(format!(
                "booking {} was cancelled",
                booking.id
            )));
        }

        if txn.notes.join.is_some() {
            if !booking.paid {
                return Err(AppError::SlotConflict(format!(
                    "booking {} is not confirmed",
                    booking.id
                )));
            }
        } else {
            if booking.roster.funded_by_other(&txn.paid_for, txn.id) {
                return Err(AppError::AlreadyFunded(format!(
                    "booking {} is already paid for these players",
                    booking.id
                )));
            }
            booking.paid = true;
            if booking.invoice_number.is_none() {
                booking.invoice_number = Some(session.next_invoice_number(now.year()).await?);
            }
            booking.roster.mark_paid(&txn.paid_for, txn.id);
        }
        booking.updated_at = now;
        session.update_booking(&mut booking).await?;

        tracing::info!(
            transaction_id = %txn.id,
            booking_id = %booking.id,
            invoice_number = ?booking.invoice_number,
            "Booking payment applied"
        );

        effects.push(SideEffect::SyncChat {
            booking_id: booking.id,
            members: booking.roster.players(),
        });
        let body = format!(
            "Payment of {} {} received for {} on {}",
            txn.amount,
            txn.currency,
            format_slots(&booking.slots),
            booking.date
        );
        effects.push(SideEffect::Notify(
            Notification::new(booking.owner_id, NotificationKind::PaymentSucceeded, body.clone())
                .for_booking(booking.id)
                .for_transaction(txn.id),
        ));
        if txn.user_id != booking.owner_id {
            effects.push(SideEffect::Notify(
                Notification::new(txn.user_id, NotificationKind::PaymentSucceeded, body)
                    .for_booking(booking.id)
                    .for_transaction(txn.id),
            ));
        }
    }
    Ok(())
}

/// Seats a paying joiner at the requested team position and completes their request.
pub(crate) async fn complete_join(
    session: &mut dyn Session,
    txn: &Transaction,
    now: DateTime<Utc>,
    effects: &mut Vec<SideEffect>,
) -> Result<(), AppError> {
    let Some(target) = txn.notes.join else {
        return Ok(());
    };

    for booking_id in &txn.booking_ids {
        let Some(mut booking) = session.booking(*booking_id).await? else {
            continue;
        };

        match booking.roster.get(target.team, target.position) {
            Some(current) => {
                if let Occupant::Player(holder) = current.occupant {
                    if holder != txn.user_id {
                        return Err(AppError::SlotConflict(format!(
                            "position {}/{} is already taken",
                            target.team, target.position
                        )));
                    }
                }
            }
            None if booking.roster.team(target.team).count() >= MAX_PLAYERS_PER_TEAM => {
                return Err(AppError::SlotConflict(format!("{} is already full", target.team)));
            }
            None => {}
        }

        let mut candidates: Vec<_> = session
            .booking_requests_for(booking.id)
            .await?
            .into_iter()
            .filter(|r| r.status.is_open() && r.targets(txn.user_id, target.team, target.position))
            .collect();
        candidates.sort_by_key(|r| r.transaction_id != Some(txn.id));
        match candidates.into_iter().next() {
            Some(mut request) => {
                request.status = RequestStatus::Completed;
                request.transaction_id = Some(txn.id);
                request.updated_at = now;
                session.update_booking_request(&mut request).await?;
            }
            None => tracing::warn!(
                transaction_id = %txn.id,
                booking_id = %booking.id,
                "No open join request matched the paid position"
            ),
        }

        booking.roster.upsert(PlayerSlot {
            team: target.team,
            position: target.position,
            occupant: Occupant::Player(txn.user_id),
            payment_status: PlayerPaymentStatus::Paid,
            funding_transaction_id: Some(txn.id),
        });
        booking.updated_at = now;
        session.update_booking(&mut booking).await?;

        tracing::info!(
            transaction_id = %txn.id,
            booking_id = %booking.id,
            team = %target.team,
            position = %target.position,
            "Joining player seated"
        );

        effects.push(SideEffect::SyncChat {
            booking_id: booking.id,
            members: vec![txn.user_id],
        });
        effects.push(SideEffect::Notify(
            Notification::new(
                txn.user_id,
                NotificationKind::JoinCompleted,
                format!("You joined {} at {}", booking.date, format_slots(&booking.slots)),
            )
            .for_booking(booking.id),
        ));
        effects.push(SideEffect::Notify(
            Notification::new(
                booking.owner_id,
                NotificationKind::JoinCompleted,
                format!("A player joined {} {}", target.team, target.position),
            )
            .for_booking(booking.id),
        ));
    }
    Ok(())
}
