//! Framework-agnostic booking and payment entities.

pub mod booking;
pub mod booking_request;
pub mod credit;
pub mod notification;
pub mod slot;
pub mod transaction;
pub mod venue;

pub use booking::{
    format_invoice_number, Booking, BookingKind, Occupant, PlayerPaymentStatus, PlayerSlot,
    Position, Roster, RosterError, TeamId,
};
pub use booking_request::{BookingRequest, RequestStatus};
pub use credit::{CreditAccount, CreditSummary};
pub use notification::{Notification, NotificationKind};
pub use slot::{format_slots, Slot};
pub use transaction::{
    JoinTarget, PaymentMethod, Transaction, TransactionNotes, TransitionError, TxStatus,
};
pub use venue::{Court, DayType, PricingRules, Venue};
