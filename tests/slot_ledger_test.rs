mod common;

use chrono::NaiveDate;
use common::*;
use courtside::domain::{PaymentMethod, PricingRules, Slot};
use courtside::error::AppError;
use std::collections::HashMap;
use uuid::Uuid;

fn slot(s: &str) -> Slot {
    s.parse().unwrap()
}

#[tokio::test]
async fn price_prefers_override_then_day_type_then_base_rate() {
    let h = Harness::new();
    let mut rules = PricingRules::default();
    rules.weekday.insert(slot("18:00"), 600);
    rules.weekday.insert(slot("19:00"), 650);
    rules
        .date_overrides
        .insert(play_date(), HashMap::from([(slot("19:00"), 900)]));
    h.store.set_pricing(h.court.id, rules);

    // 18:00 weekday list, 19:00 date override, 20:00 base rate.
    let booking = h.book(Uuid::new_v4(), &["18:00", "19:00", "20:00"]).await;
    assert_eq!(booking.amount, 600 + 900 + COURT_RATE);
    assert!(!booking.paid);
    assert!(booking.invoice_number.is_none());
}

#[tokio::test]
async fn pending_bookings_do_not_hold_slots() {
    let h = Harness::new();
    let first_owner = Uuid::new_v4();
    let first = h.book(first_owner, &["18:00"]).await;
    let second = h.book(Uuid::new_v4(), &["18:00"]).await;
    assert_ne!(first.id, second.id);

    h.store.set_balance(first_owner, COURT_RATE);
    h.pay(&first, first_owner, PaymentMethod::Credit, None)
        .await
        .unwrap();

    let err = h
        .state
        .ledger
        .create_booking(
            h.booking_request(Uuid::new_v4(), Uuid::new_v4(), &["17:00", "18:00"]),
            now(),
        )
        .await
        .unwrap_err();
    match err {
        AppError::SlotConflict(msg) => {
            assert!(msg.contains("18:00"));
            assert!(!msg.contains("17:00"));
        }
        other => panic!("expected slot conflict, got {:?}", other),
    }

    // Paying for the pending duplicate now fails at commit.
    let owner = second.owner_id;
    h.store.set_balance(owner, COURT_RATE);
    let err = h
        .pay(&second, owner, PaymentMethod::Credit, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::SlotConflict(_)));
    assert_eq!(h.store.balance(owner), COURT_RATE);
}

#[tokio::test]
async fn started_and_past_slots_are_rejected() {
    let h = Harness::new();
    let owner = Uuid::new_v4();

    // Local time at the venue is 10:30.
    let mut today = h.booking_request(owner, Uuid::new_v4(), &["10:00"]);
    today.date = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
    let err = h.state.ledger.create_booking(today.clone(), now()).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(ref msg) if msg.contains("10:00")));

    today.slots = vec![slot("11:00")];
    h.state.ledger.create_booking(today, now()).await.unwrap();

    let mut past = h.booking_request(owner, Uuid::new_v4(), &["18:00"]);
    past.date = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
    let err = h.state.ledger.create_booking(past, now()).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn request_shape_is_validated() {
    let h = Harness::new();
    let owner = Uuid::new_v4();

    let unscheduled = h.booking_request(owner, Uuid::new_v4(), &["03:00"]);
    let err = h.state.ledger.create_booking(unscheduled, now()).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let repeated = h.booking_request(owner, Uuid::new_v4(), &["18:00", "18:00"]);
    let err = h.state.ledger.create_booking(repeated, now()).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let empty = h.booking_request(owner, Uuid::new_v4(), &[]);
    let err = h.state.ledger.create_booking(empty, now()).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let mut unknown_court = h.booking_request(owner, Uuid::new_v4(), &["18:00"]);
    unknown_court.court_id = Uuid::new_v4();
    let err = h
        .state
        .ledger
        .create_booking(unknown_court, now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
