mod common;

use common::*;
use courtside::domain::{BookingKind, NotificationKind, PaymentMethod, Transaction, TxStatus};
use courtside::error::AppError;
use courtside::ports::Store;
use courtside::services::CancelBooking;
use uuid::Uuid;

fn captured(user_id: Uuid, booking_id: Uuid, amount: i64) -> Transaction {
    let mut txn = Transaction::new(
        user_id,
        vec![booking_id],
        vec![user_id],
        amount,
        CURRENCY.to_string(),
        PaymentMethod::Gateway,
        now(),
    );
    txn.transition(TxStatus::Captured, now()).unwrap();
    txn.paid_at = Some(now());
    txn
}

fn cancel(booking_id: Uuid, refund_percentage: i64) -> CancelBooking {
    CancelBooking {
        booking_id,
        refund_percentage,
        reason: "Court resurfacing".to_string(),
    }
}

#[tokio::test]
async fn split_payments_are_refunded_pro_rata() {
    let h = Harness::new();
    let owner = Uuid::new_v4();
    let partner = Uuid::new_v4();
    let booking = h
        .state
        .ledger
        .create_booking(h.booking_request(owner, partner, &["18:00", "19:00"]), now())
        .await
        .unwrap();

    let owner_txn = captured(owner, booking.id, 500);
    let partner_txn = captured(partner, booking.id, 300);
    {
        let mut session = h.store.begin().await.unwrap();
        session.insert_transaction(&owner_txn).await.unwrap();
        session.insert_transaction(&partner_txn).await.unwrap();
        let mut paid = session.booking(booking.id).await.unwrap().unwrap();
        paid.paid = true;
        paid.roster.mark_paid(&[owner], owner_txn.id);
        paid.roster.mark_paid(&[partner], partner_txn.id);
        session.update_booking(&mut paid).await.unwrap();
        session.commit().await.unwrap();
    }

    let summary = h
        .state
        .cancellations
        .cancel(cancel(booking.id, 50), now())
        .await
        .unwrap();
    assert_eq!(summary.total_credited, 400);
    assert_eq!(summary.refunds.len(), 2);

    assert_eq!(h.store.balance(owner), 250);
    assert_eq!(h.store.balance(partner), 150);

    let refunded = h.store.transaction(owner_txn.id).unwrap();
    assert_eq!(refunded.status, TxStatus::Refunded);
    assert_eq!(refunded.refunded_amount, 250);

    let ledger = h.store.transactions_for(partner);
    assert_eq!(ledger.len(), 2);
    let entry = ledger
        .iter()
        .find(|txn| txn.notes.refund_of == Some(partner_txn.id))
        .expect("refund ledger entry");
    assert_eq!(entry.amount, 150);
    assert_eq!(entry.status, TxStatus::Refunded);

    let cancelled = h.store.booking(booking.id).unwrap();
    assert_eq!(cancelled.kind, BookingKind::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Court resurfacing"));
    assert_eq!(cancelled.refunded_credit, 400);

    assert_eq!(
        h.notifier.kinds_for(owner),
        vec![NotificationKind::BookingCancelled]
    );
    assert_eq!(
        h.notifier.kinds_for(partner),
        vec![NotificationKind::BookingCancelled]
    );
}

#[tokio::test]
async fn full_refund_restores_credit_and_frees_the_slot() {
    let h = Harness::new();
    let owner = Uuid::new_v4();
    h.store.set_balance(owner, 400);
    let booking = h.book(owner, &["18:00"]).await;

    let intent = h
        .pay(&booking, owner, PaymentMethod::Credit, None)
        .await
        .unwrap();
    assert_eq!(intent.transaction.status, TxStatus::Captured);
    assert_eq!(h.store.balance(owner), 0);

    h.state
        .cancellations
        .cancel(cancel(booking.id, 100), now())
        .await
        .unwrap();
    assert_eq!(h.store.balance(owner), 400);

    // The cancelled booking no longer holds 18:00.
    let next = Uuid::new_v4();
    h.store.set_balance(next, 400);
    let rebooking = h.book(next, &["18:00"]).await;
    let rebooked = h
        .pay(&rebooking, next, PaymentMethod::Credit, None)
        .await
        .unwrap();
    assert_eq!(rebooked.transaction.status, TxStatus::Captured);
    assert!(h.store.booking(rebooking.id).unwrap().paid);
}

#[tokio::test]
async fn combined_payment_captured_by_webhook_is_fully_refunded() {
    let h = Harness::new();
    let owner = Uuid::new_v4();
    h.store.set_balance(owner, 250);
    let booking = h.book(owner, &["18:00"]).await;

    let intent = h
        .pay(&booking, owner, PaymentMethod::Combined, Some(150))
        .await
        .unwrap();
    let ack = h
        .deliver(&payment_event(
            "payment.captured",
            &intent.order.unwrap().id,
            "pay_1",
            250,
        ))
        .await
        .unwrap();
    assert_eq!(ack.message, "Payment applied");
    assert_eq!(h.store.balance(owner), 100);
    assert!(h.store.booking(booking.id).unwrap().paid);

    let summary = h
        .state
        .cancellations
        .cancel(cancel(booking.id, 100), now())
        .await
        .unwrap();
    assert_eq!(summary.total_credited, 400);

    // The 150 of credit spent comes back along with the 250 paid at the gateway.
    let credit = h.state.credit.summary(owner).await.unwrap();
    assert_eq!(credit.balance, 500);
    assert_eq!(credit.available, 500);

    let txn = h.store.transaction(intent.transaction.id).unwrap();
    assert_eq!(txn.status, TxStatus::Refunded);
    assert_eq!(txn.refunded_amount, 400);
    let entry = h
        .store
        .transactions_for(owner)
        .into_iter()
        .find(|t| t.notes.refund_of == Some(txn.id))
        .expect("refund ledger entry");
    assert_eq!(entry.credit_used, 150);
    assert_eq!(entry.amount, 400);
}

#[tokio::test]
async fn cancelling_twice_is_rejected() {
    let h = Harness::new();
    let owner = Uuid::new_v4();
    let booking = h.book(owner, &["18:00"]).await;

    h.state
        .cancellations
        .cancel(cancel(booking.id, 0), now())
        .await
        .unwrap();
    let err = h
        .state
        .cancellations
        .cancel(cancel(booking.id, 0), now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn invalid_percentage_and_reason_are_rejected() {
    let h = Harness::new();
    let booking = h.book(Uuid::new_v4(), &["18:00"]).await;

    let err = h
        .state
        .cancellations
        .cancel(cancel(booking.id, 101), now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let mut blank = cancel(booking.id, 50);
    blank.reason = "   ".to_string();
    let err = h.state.cancellations.cancel(blank, now()).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    assert_eq!(h.store.booking(booking.id).unwrap().kind, BookingKind::Booking);
}

#[tokio::test]
async fn missing_booking_is_not_found() {
    let h = Harness::new();
    let err = h
        .state
        .cancellations
        .cancel(cancel(Uuid::new_v4(), 50), now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
