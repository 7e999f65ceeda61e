mod common;

use chrono::Duration;
use common::*;
use courtside::domain::{NotificationKind, PaymentMethod, PlayerPaymentStatus, TxStatus};
use courtside::error::AppError;
use courtside::services::reconciler::sign;
use courtside::services::{CancelBooking, InitiatePayment};
use uuid::Uuid;

#[tokio::test]
async fn combined_capture_deducts_credit_once() {
    let h = Harness::new();
    let owner = Uuid::new_v4();
    h.store.set_balance(owner, 250);
    let booking = h.book(owner, &["18:00"]).await;

    let intent = h
        .pay(&booking, owner, PaymentMethod::Combined, Some(100))
        .await
        .unwrap();
    let order = intent.order.expect("combined payments open an order");
    assert_eq!(order.amount, 300);
    assert_eq!(h.state.credit.summary(owner).await.unwrap().available, 150);

    let body = payment_event("payment.captured", &order.id, "pay_1", 300);
    let ack = h.deliver(&body).await.unwrap();
    assert!(ack.success);
    assert_eq!(ack.message, "Payment applied");
    assert_eq!(h.store.balance(owner), 150);

    let redelivery = h.deliver(&body).await.unwrap();
    assert_eq!(redelivery.message, "Already processed");
    assert_eq!(h.store.balance(owner), 150);

    let txn = h.store.transaction(intent.transaction.id).unwrap();
    assert_eq!(txn.status, TxStatus::Captured);
    assert!(txn.credit_deducted);
    assert!(txn.webhook_verified);
    assert_eq!(txn.gateway_payment_id.as_deref(), Some("pay_1"));
}

#[tokio::test]
async fn capture_confirms_booking_and_syncs_chat() {
    let h = Harness::new();
    let owner = Uuid::new_v4();
    let booking = h.book(owner, &["18:00", "19:00"]).await;
    assert_eq!(booking.amount, 2 * COURT_RATE);

    let intent = h
        .pay(&booking, owner, PaymentMethod::Gateway, None)
        .await
        .unwrap();
    let order = intent.order.unwrap();
    h.deliver(&payment_event("payment.captured", &order.id, "pay_1", 800))
        .await
        .unwrap();

    let stored = h.store.booking(booking.id).unwrap();
    assert!(stored.paid);
    assert_eq!(stored.invoice_number.as_deref(), Some("INV-2026-000001"));
    assert!(stored
        .roster
        .entries()
        .iter()
        .all(|slot| slot.payment_status == PlayerPaymentStatus::Paid));

    let members = h.chat.members(booking.id).unwrap();
    assert_eq!(members.len(), 2);
    assert!(members.contains(&owner));
    assert_eq!(
        h.notifier.kinds_for(owner),
        vec![NotificationKind::PaymentSucceeded]
    );
}

#[tokio::test]
async fn unknown_order_is_acknowledged() {
    let h = Harness::new();
    let ack = h
        .deliver(&payment_event("payment.captured", "order_missing", "pay_1", 400))
        .await
        .unwrap();
    assert!(ack.success);
    assert_eq!(ack.message, "Transaction not found");
}

#[tokio::test]
async fn bad_or_missing_signature_is_rejected_without_effects() {
    let h = Harness::new();
    let owner = Uuid::new_v4();
    let booking = h.book(owner, &["18:00"]).await;
    let intent = h
        .pay(&booking, owner, PaymentMethod::Gateway, None)
        .await
        .unwrap();
    let body = payment_event("payment.captured", &intent.order.unwrap().id, "pay_1", 400);

    let forged = sign("some-other-secret", &body);
    let err = h
        .state
        .reconciler
        .handle(&body, Some(&forged), now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));

    let err = h.state.reconciler.handle(&body, None, now()).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));

    assert_eq!(
        h.store.transaction(intent.transaction.id).unwrap().status,
        TxStatus::Created
    );
    assert!(!h.store.booking(booking.id).unwrap().paid);
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let h = Harness::new();
    let err = h.deliver(b"{not json").await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn concurrent_duplicate_deliveries_deduct_once() {
    let h = Harness::new();
    let owner = Uuid::new_v4();
    h.store.set_balance(owner, 100);
    let booking = h.book(owner, &["18:00"]).await;
    let intent = h
        .pay(&booking, owner, PaymentMethod::Combined, Some(100))
        .await
        .unwrap();
    let body = payment_event("payment.captured", &intent.order.unwrap().id, "pay_1", 300);

    let (first, second) = tokio::join!(h.deliver(&body), h.deliver(&body));
    let mut messages = vec![first.unwrap().message, second.unwrap().message];
    messages.sort();
    assert_eq!(messages, vec!["Already processed", "Payment applied"]);

    assert_eq!(h.store.balance(owner), 0);
    let booking = h.store.booking(booking.id).unwrap();
    assert_eq!(booking.invoice_number.as_deref(), Some("INV-2026-000001"));
}

#[tokio::test]
async fn losing_capture_is_returned_as_credit() {
    let h = Harness::new();
    let first_owner = Uuid::new_v4();
    let second_owner = Uuid::new_v4();
    let first = h.book(first_owner, &["18:00"]).await;
    let second = h.book(second_owner, &["18:00"]).await;

    let first_order = h
        .pay(&first, first_owner, PaymentMethod::Gateway, None)
        .await
        .unwrap()
        .order
        .unwrap();
    let losing = h
        .pay(&second, second_owner, PaymentMethod::Gateway, None)
        .await
        .unwrap();
    let losing_order = losing.order.unwrap();

    h.deliver(&payment_event("payment.captured", &first_order.id, "pay_a", 400))
        .await
        .unwrap();
    let ack = h
        .deliver(&payment_event("payment.captured", &losing_order.id, "pay_b", 400))
        .await
        .unwrap();
    assert!(ack.success);
    assert_eq!(
        ack.message,
        "Payment could not be applied and was returned as credit"
    );

    assert!(h.store.booking(first.id).unwrap().paid);
    assert!(!h.store.booking(second.id).unwrap().paid);
    assert_eq!(h.store.balance(second_owner), 400);

    let txn = h.store.transaction(losing.transaction.id).unwrap();
    assert_eq!(txn.status, TxStatus::Refunded);
    assert_eq!(txn.refunded_amount, 400);
    assert_eq!(txn.failure_reason.as_deref(), Some("slot_unavailable"));
    assert_eq!(txn.gateway_payment_id.as_deref(), Some("pay_b"));
    assert!(h
        .notifier
        .kinds_for(second_owner)
        .contains(&NotificationKind::SlotUnavailable));

    // Redelivery of the compensated capture changes nothing.
    h.deliver(&payment_event("payment.captured", &losing_order.id, "pay_b", 400))
        .await
        .unwrap();
    assert_eq!(h.store.balance(second_owner), 400);
}

#[tokio::test]
async fn capture_after_failure_is_returned_as_credit() {
    let h = Harness::new();
    let owner = Uuid::new_v4();
    h.store.set_balance(owner, 100);
    let booking = h.book(owner, &["18:00"]).await;
    let intent = h
        .pay(&booking, owner, PaymentMethod::Combined, Some(100))
        .await
        .unwrap();
    let order_id = intent.order.unwrap().id;

    let ack = h
        .deliver(&failure_event(&order_id, "pay_1", "card declined"))
        .await
        .unwrap();
    assert_eq!(ack.message, "Payment failure recorded");

    let txn = h.store.transaction(intent.transaction.id).unwrap();
    assert_eq!(txn.status, TxStatus::Failed);
    assert_eq!(txn.failure_reason.as_deref(), Some("card declined"));
    assert!(!txn.credit_deducted);
    assert_eq!(h.store.balance(owner), 100);
    assert_eq!(h.state.credit.summary(owner).await.unwrap().available, 100);
    assert!(h
        .notifier
        .kinds_for(owner)
        .contains(&NotificationKind::PaymentFailed));

    let ack = h
        .deliver(&payment_event("payment.captured", &order_id, "pay_2", 300))
        .await
        .unwrap();
    assert_eq!(
        ack.message,
        "Payment could not be applied and was returned as credit"
    );
    let txn = h.store.transaction(intent.transaction.id).unwrap();
    assert_eq!(txn.status, TxStatus::Refunded);
    assert_eq!(txn.failure_reason.as_deref(), Some("transaction_failed"));
    assert_eq!(txn.refunded_amount, 300);
    assert!(!txn.credit_reserved);
    assert!(!txn.credit_deducted);
    assert_eq!(h.store.balance(owner), 400);
    assert!(!h.store.booking(booking.id).unwrap().paid);
}

#[tokio::test]
async fn second_pending_payment_for_the_same_players_is_refused() {
    let h = Harness::new();
    let owner = Uuid::new_v4();
    let booking = h.book(owner, &["18:00"]).await;

    h.pay(&booking, owner, PaymentMethod::Gateway, None)
        .await
        .unwrap();
    let err = h
        .pay(&booking, owner, PaymentMethod::Gateway, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(ref m) if m.contains("pending")));
    assert_eq!(h.store.transactions_for(owner).len(), 1);
}

#[tokio::test]
async fn double_payment_is_returned_and_cancellation_covers_the_rest() {
    let h = Harness::new();
    let owner = Uuid::new_v4();
    let booking = h.book(owner, &["18:00"]).await;

    // The first checkout went quiet long enough that a new one is allowed.
    let first = h
        .state
        .payments
        .initiate(
            InitiatePayment {
                booking_id: booking.id,
                payer_id: owner,
                method: PaymentMethod::Gateway,
                credit_amount: None,
                paid_for: vec![],
                join: None,
            },
            now() - Duration::hours(2),
        )
        .await
        .unwrap();
    let second = h
        .pay(&booking, owner, PaymentMethod::Gateway, None)
        .await
        .unwrap();

    let ack = h
        .deliver(&payment_event(
            "payment.captured",
            &first.order.unwrap().id,
            "pay_a",
            400,
        ))
        .await
        .unwrap();
    assert_eq!(ack.message, "Payment applied");
    let ack = h
        .deliver(&payment_event(
            "payment.captured",
            &second.order.unwrap().id,
            "pay_b",
            400,
        ))
        .await
        .unwrap();
    assert_eq!(
        ack.message,
        "Payment could not be applied and was returned as credit"
    );

    let loser = h.store.transaction(second.transaction.id).unwrap();
    assert_eq!(loser.status, TxStatus::Refunded);
    assert_eq!(loser.failure_reason.as_deref(), Some("already_paid"));
    assert_eq!(h.store.balance(owner), 400);

    let paid = h.store.booking(booking.id).unwrap();
    assert_eq!(paid.roster.funding_transactions(), vec![first.transaction.id]);

    let summary = h
        .state
        .cancellations
        .cancel(
            CancelBooking {
                booking_id: booking.id,
                refund_percentage: 100,
                reason: "Court resurfacing".to_string(),
            },
            now(),
        )
        .await
        .unwrap();
    assert_eq!(summary.refunds.len(), 1);
    assert_eq!(summary.total_credited, 400);
    assert_eq!(
        h.store.transaction(first.transaction.id).unwrap().status,
        TxStatus::Refunded
    );
    // Both captured payments came back.
    assert_eq!(h.store.balance(owner), 800);
}

#[tokio::test]
async fn different_payment_on_settled_order_is_returned_once() {
    let h = Harness::new();
    let owner = Uuid::new_v4();
    let booking = h.book(owner, &["18:00"]).await;
    let intent = h
        .pay(&booking, owner, PaymentMethod::Gateway, None)
        .await
        .unwrap();
    let order_id = intent.order.unwrap().id;

    h.deliver(&payment_event("payment.captured", &order_id, "pay_1", 400))
        .await
        .unwrap();
    let extra = payment_event("payment.captured", &order_id, "pay_2", 400);
    let ack = h.deliver(&extra).await.unwrap();
    assert_eq!(
        ack.message,
        "Payment could not be applied and was returned as credit"
    );
    assert_eq!(h.store.balance(owner), 400);

    let original = h.store.transaction(intent.transaction.id).unwrap();
    assert_eq!(original.status, TxStatus::Captured);
    assert_eq!(original.gateway_payment_id.as_deref(), Some("pay_1"));

    let entry = h
        .store
        .transactions_for(owner)
        .into_iter()
        .find(|txn| txn.notes.refund_of == Some(intent.transaction.id))
        .expect("returned payment is on the ledger");
    assert_eq!(entry.gateway_payment_id.as_deref(), Some("pay_2"));
    assert_eq!(entry.refunded_amount, 400);
    assert_eq!(entry.failure_reason.as_deref(), Some("duplicate_payment"));

    let again = h.deliver(&extra).await.unwrap();
    assert_eq!(again.message, "Already processed");
    assert_eq!(h.store.balance(owner), 400);
    assert!(h.store.booking(booking.id).unwrap().paid);
}

#[tokio::test]
async fn processed_refund_moves_transaction_to_refunded() {
    let h = Harness::new();
    let owner = Uuid::new_v4();
    let booking = h.book(owner, &["18:00"]).await;
    let intent = h
        .pay(&booking, owner, PaymentMethod::Gateway, None)
        .await
        .unwrap();
    h.deliver(&payment_event(
        "payment.captured",
        &intent.order.unwrap().id,
        "pay_1",
        400,
    ))
    .await
    .unwrap();

    let refund = h
        .state
        .payments
        .request_gateway_refund(intent.transaction.id, Some(150))
        .await
        .unwrap();
    assert_eq!(h.gateway.refunds.lock().unwrap().len(), 1);

    let created = h
        .deliver(&refund_event("refund.created", &refund.id, "pay_1", 150))
        .await
        .unwrap();
    assert_eq!(created.message, "Refund recorded");
    assert_eq!(
        h.store.transaction(intent.transaction.id).unwrap().status,
        TxStatus::Captured
    );

    h.deliver(&refund_event("refund.processed", &refund.id, "pay_1", 150))
        .await
        .unwrap();
    let txn = h.store.transaction(intent.transaction.id).unwrap();
    assert_eq!(txn.status, TxStatus::Refunded);
    assert_eq!(txn.refunded_amount, 150);
    assert_eq!(txn.refund_id.as_deref(), Some(refund.id.as_str()));
    assert_eq!(h.notifier.count(NotificationKind::RefundProcessed), 1);

    let again = h
        .deliver(&refund_event("refund.processed", &refund.id, "pay_1", 150))
        .await
        .unwrap();
    assert_eq!(again.message, "Already processed");
}

#[tokio::test]
async fn late_authorized_event_after_capture_is_ignored() {
    let h = Harness::new();
    let owner = Uuid::new_v4();
    let booking = h.book(owner, &["18:00"]).await;
    let intent = h
        .pay(&booking, owner, PaymentMethod::Gateway, None)
        .await
        .unwrap();
    let order_id = intent.order.unwrap().id;

    h.deliver(&payment_event("payment.captured", &order_id, "pay_1", 400))
        .await
        .unwrap();
    let ack = h
        .deliver(&payment_event("payment.authorized", &order_id, "pay_1", 400))
        .await
        .unwrap();
    assert_eq!(ack.message, "Already processed");
    assert_eq!(
        h.store.transaction(intent.transaction.id).unwrap().status,
        TxStatus::Captured
    );
    assert_eq!(h.notifier.count(NotificationKind::PaymentSucceeded), 1);
}

#[tokio::test]
async fn unknown_event_is_acknowledged() {
    let h = Harness::new();
    let body = serde_json::json!({"event": "order.paid", "payload": {}})
        .to_string()
        .into_bytes();
    let ack = h.deliver(&body).await.unwrap();
    assert_eq!(ack.message, "Event ignored");
}
