//! In-app notifications emitted by booking and payment flows.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PaymentSucceeded,
    PaymentFailed,
    RefundProcessed,
    BookingCancelled,
    SlotUnavailable,
    JoinRequested,
    JoinAccepted,
    JoinRejected,
    JoinCompleted,
    CreditGranted,
}

impl NotificationKind {
    pub fn title(&self) -> &'static str {
        match self {
            NotificationKind::PaymentSucceeded => "Payment successful",
            NotificationKind::PaymentFailed => "Payment failed",
            NotificationKind::RefundProcessed => "Refund processed",
            NotificationKind::BookingCancelled => "Booking cancelled",
            NotificationKind::SlotUnavailable => "Slot no longer available",
            NotificationKind::JoinRequested => "New join request",
            NotificationKind::JoinAccepted => "Join request accepted",
            NotificationKind::JoinRejected => "Join request declined",
            NotificationKind::JoinCompleted => "Player joined",
            NotificationKind::CreditGranted => "Credit added",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<Uuid>,
}

impl Notification {
    pub fn new(user_id: Uuid, kind: NotificationKind, body: impl Into<String>) -> Self {
        Self {
            user_id,
            kind,
            title: kind.title().to_string(),
            body: body.into(),
            booking_id: None,
            transaction_id: None,
        }
    }

    pub fn for_booking(mut self, booking_id: Uuid) -> Self {
        self.booking_id = Some(booking_id);
        self
    }

    pub fn for_transaction(mut self, transaction_id: Uuid) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }
}
