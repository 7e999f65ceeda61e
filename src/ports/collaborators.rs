//! External collaborators: notification delivery, chat groups and the payment gateway.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::Notification;

/// Fire-and-forget delivery. Callers log failures and carry on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Group chat attached to a booking.
#[async_trait]
pub trait ChatDirectory: Send + Sync {
    async fn ensure_group(&self, booking_id: Uuid) -> anyhow::Result<()>;
    /// Adds the member if absent. Returns `true` when the member was added.
    async fn add_member(&self, booking_id: Uuid, user_id: Uuid) -> anyhow::Result<bool>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRefund {
    pub id: String,
    pub payment_id: String,
    pub amount: i64,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Request(String),
    #[error("gateway rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("gateway circuit breaker is open")]
    CircuitOpen,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens an order for `amount` minor units. `receipt` is our reference for the order.
    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError>;

    async fn create_refund(&self, payment_id: &str, amount: i64)
        -> Result<GatewayRefund, GatewayError>;
}
