#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use courtside::adapters::{InMemoryChatDirectory, InMemoryStore};
use courtside::domain::{
    Booking, Court, Notification, NotificationKind, PaymentMethod, Position, TeamId, Venue,
};
use courtside::error::AppError;
use courtside::ports::{GatewayError, GatewayOrder, GatewayRefund, Notifier, PaymentGateway};
use courtside::services::reconciler::sign;
use courtside::services::{
    ConnectionRegistry, CreateBooking, InitiatePayment, PaymentIntent, RosterEntry, WebhookAck,
};
use courtside::{AppState, Collaborators, Settings};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const ADMIN_KEY: &str = "admin-test-key";
pub const CURRENCY: &str = "INR";
pub const COURT_RATE: i64 = 400;

/// 2026-10-17 10:30 at the venue (+05:30).
pub fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-10-17T05:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// A Monday, so weekday prices apply.
pub fn play_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

#[derive(Default)]
pub struct StubGateway {
    orders: AtomicUsize,
    pub refunds: Mutex<Vec<GatewayRefund>>,
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        let n = self.orders.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayOrder {
            id: format!("order_{}", n),
            amount,
            currency: currency.to_string(),
            receipt: receipt.to_string(),
        })
    }

    async fn create_refund(
        &self,
        payment_id: &str,
        amount: i64,
    ) -> Result<GatewayRefund, GatewayError> {
        let refund = GatewayRefund {
            id: format!("rfnd_{}", self.refunds.lock().unwrap().len() + 1),
            payment_id: payment_id.to_string(),
            amount,
            status: Some("pending".to_string()),
        };
        self.refunds.lock().unwrap().push(refund.clone());
        Ok(refund)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn kinds_for(&self, user_id: Uuid) -> Vec<NotificationKind> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.user_id == user_id)
            .map(|n| n.kind)
            .collect()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.kind == kind)
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

pub struct Harness {
    pub store: InMemoryStore,
    pub chat: InMemoryChatDirectory,
    pub notifier: Arc<RecordingNotifier>,
    pub gateway: Arc<StubGateway>,
    pub state: AppState,
    pub venue: Venue,
    pub court: Court,
}

impl Harness {
    pub fn new() -> Self {
        let store = InMemoryStore::new();
        let venue = Venue {
            id: Uuid::new_v4(),
            name: "Riverside Padel".to_string(),
            active: true,
            utc_offset_minutes: 330,
            slot_schedule: vec![],
        };
        let court = Court {
            id: Uuid::new_v4(),
            venue_id: venue.id,
            name: "Court 1".to_string(),
            active: true,
            base_hourly_rate: COURT_RATE,
        };
        store.seed_venue(venue.clone());
        store.seed_court(court.clone());

        let chat = InMemoryChatDirectory::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let gateway = Arc::new(StubGateway::default());
        let state = AppState::new(
            Collaborators {
                store: Arc::new(store.clone()),
                gateway: gateway.clone(),
                chat: Arc::new(chat.clone()),
                notifier: notifier.clone(),
                registry: Arc::new(ConnectionRegistry::new()),
            },
            Settings {
                currency: CURRENCY.to_string(),
                webhook_secret: WEBHOOK_SECRET.to_string(),
                admin_api_key: ADMIN_KEY.to_string(),
                reaper_stale_after: chrono::Duration::hours(1),
            },
        );

        Self {
            store,
            chat,
            notifier,
            gateway,
            state,
            venue,
            court,
        }
    }

    pub fn booking_request(&self, owner: Uuid, partner: Uuid, slots: &[&str]) -> CreateBooking {
        CreateBooking {
            owner_id: owner,
            venue_id: self.venue.id,
            court_id: self.court.id,
            date: play_date(),
            slots: slots.iter().map(|s| s.parse().unwrap()).collect(),
            roster: vec![
                RosterEntry::player(TeamId::Team1, Position::Left, owner),
                RosterEntry::player(TeamId::Team2, Position::Left, partner),
            ],
            is_public: false,
            complete: false,
        }
    }

    /// A pending booking for `owner` and a fresh partner.
    pub async fn book(&self, owner: Uuid, slots: &[&str]) -> Booking {
        self.state
            .ledger
            .create_booking(self.booking_request(owner, Uuid::new_v4(), slots), now())
            .await
            .unwrap()
    }

    pub async fn pay(
        &self,
        booking: &Booking,
        payer: Uuid,
        method: PaymentMethod,
        credit_amount: Option<i64>,
    ) -> Result<PaymentIntent, AppError> {
        self.state
            .payments
            .initiate(
                InitiatePayment {
                    booking_id: booking.id,
                    payer_id: payer,
                    method,
                    credit_amount,
                    paid_for: vec![],
                    join: None,
                },
                now(),
            )
            .await
    }

    pub async fn deliver(&self, body: &[u8]) -> Result<WebhookAck, AppError> {
        let signature = sign(WEBHOOK_SECRET, body);
        self.state
            .reconciler
            .handle(body, Some(&signature), now())
            .await
    }
}

pub fn payment_event(event: &str, order_id: &str, payment_id: &str, amount: i64) -> Vec<u8> {
    json!({
        "event": event,
        "payload": {
            "payment": {
                "entity": {
                    "id": payment_id,
                    "order_id": order_id,
                    "amount": amount,
                    "status": event.trim_start_matches("payment."),
                }
            }
        }
    })
    .to_string()
    .into_bytes()
}

pub fn failure_event(order_id: &str, payment_id: &str, description: &str) -> Vec<u8> {
    json!({
        "event": "payment.failed",
        "payload": {
            "payment": {
                "entity": {
                    "id": payment_id,
                    "order_id": order_id,
                    "amount": 0,
                    "status": "failed",
                    "error_description": description,
                }
            }
        }
    })
    .to_string()
    .into_bytes()
}

pub fn refund_event(event: &str, refund_id: &str, payment_id: &str, amount: i64) -> Vec<u8> {
    json!({
        "event": event,
        "payload": {
            "refund": {
                "entity": {
                    "id": refund_id,
                    "payment_id": payment_id,
                    "amount": amount,
                }
            }
        }
    })
    .to_string()
    .into_bytes()
}
