//! Storage and collaborator boundaries.
//! Services depend on these traits; adapters provide PostgreSQL, in-memory and HTTP backends.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    format_slots, Booking, BookingRequest, Court, CreditAccount, PaymentMethod, PricingRules,
    Slot, Transaction, Venue,
};

pub mod collaborators;

pub use collaborators::{
    ChatDirectory, GatewayError, GatewayOrder, GatewayRefund, Notifier, PaymentGateway,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A concurrent session changed what this one read or wrote.
    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("slot(s) {} already booked", format_slots(.0))]
    SlotTaken(Vec<Slot>),

    #[error("insufficient credit: balance {balance}, requested {requested}")]
    InsufficientCredit { balance: i64, requested: i64 },

    #[error("database error: {0}")]
    Database(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Opens atomic sessions.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> RepositoryResult<Box<dyn Session>>;
}

/// One atomic unit of reads and writes.
///
/// Dropping a session without calling [`Session::commit`] discards every write made through it.
/// Versioned entities (`Booking`, `Transaction`, `BookingRequest`) are written with an
/// optimistic check on `version`; a stale write fails with [`RepositoryError::Conflict`] and the
/// in-memory `version` is bumped on success.
#[async_trait]
pub trait Session: Send {
    async fn venue(&mut self, id: Uuid) -> RepositoryResult<Option<Venue>>;
    async fn court(&mut self, id: Uuid) -> RepositoryResult<Option<Court>>;
    async fn pricing(&mut self, court_id: Uuid) -> RepositoryResult<PricingRules>;

    /// Slots held by paid, non-cancelled bookings on a court and date.
    async fn confirmed_slots(&mut self, court_id: Uuid, date: NaiveDate)
        -> RepositoryResult<Vec<Slot>>;

    async fn booking(&mut self, id: Uuid) -> RepositoryResult<Option<Booking>>;
    async fn insert_booking(&mut self, booking: &Booking) -> RepositoryResult<()>;
    /// Fails with [`RepositoryError::SlotTaken`] when a confirmed booking would overlap another.
    async fn update_booking(&mut self, booking: &mut Booking) -> RepositoryResult<()>;
    async fn next_invoice_number(&mut self, year: i32) -> RepositoryResult<String>;

    async fn transaction(&mut self, id: Uuid) -> RepositoryResult<Option<Transaction>>;
    async fn transaction_by_order(&mut self, order_id: &str)
        -> RepositoryResult<Option<Transaction>>;
    async fn transaction_by_payment(&mut self, payment_id: &str)
        -> RepositoryResult<Option<Transaction>>;
    async fn insert_transaction(&mut self, txn: &Transaction) -> RepositoryResult<()>;
    async fn update_transaction(&mut self, txn: &mut Transaction) -> RepositoryResult<()>;
    /// `created` transactions linked to a booking, oldest first.
    async fn pending_transactions_for(&mut self, booking_id: Uuid)
        -> RepositoryResult<Vec<Transaction>>;
    /// `created` transactions of `method` created before `older_than`, oldest first.
    async fn stale_transactions(
        &mut self,
        method: PaymentMethod,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> RepositoryResult<Vec<Transaction>>;

    /// Reads the account and locks it for the rest of the session.
    async fn credit_account(&mut self, user_id: Uuid) -> RepositoryResult<CreditAccount>;
    /// Sum of `credit_used` over `created` transactions still holding a reservation.
    async fn held_credit(&mut self, user_id: Uuid) -> RepositoryResult<i64>;
    /// Atomically adds `delta` to the balance; refuses to go below zero.
    async fn adjust_credit(&mut self, user_id: Uuid, delta: i64)
        -> RepositoryResult<CreditAccount>;

    async fn booking_request(&mut self, id: Uuid) -> RepositoryResult<Option<BookingRequest>>;
    async fn booking_requests_for(&mut self, booking_id: Uuid)
        -> RepositoryResult<Vec<BookingRequest>>;
    async fn insert_booking_request(&mut self, request: &BookingRequest) -> RepositoryResult<()>;
    async fn update_booking_request(&mut self, request: &mut BookingRequest)
        -> RepositoryResult<()>;

    async fn commit(self: Box<Self>) -> RepositoryResult<()>;
}
