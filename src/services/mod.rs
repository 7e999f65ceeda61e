pub mod cancellation;
pub mod credit;
pub mod effects;
pub mod join_requests;
pub mod payments;
pub mod reaper;
pub mod reconciler;
pub mod registry;
pub mod slot_ledger;

pub use cancellation::{CancellationService, CancellationSummary, CancelBooking};
pub use credit::CreditLedger;
pub use effects::{EffectDispatcher, SideEffect};
pub use join_requests::{JoinRequestService, RequestToJoin, RespondToRequest};
pub use payments::{InitiatePayment, PaymentIntent, PaymentService};
pub use reaper::Reaper;
pub use reconciler::{GatewayEvent, WebhookAck, WebhookReconciler};
pub use registry::ConnectionRegistry;
pub use slot_ledger::{CreateBooking, RosterEntry, SlotLedger};

use std::future::Future;

use crate::error::AppError;

/// Attempts per atomic session before a write conflict is given up on.
pub const MAX_SESSION_ATTEMPTS: u32 = 3;

/// Runs `attempt` again while it fails with a storage write conflict.
pub(crate) async fn retry_on_conflict<T, F, Fut>(operation: &str, mut attempt: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut tries = 1;
    loop {
        match attempt().await {
            Err(e) if e.is_write_conflict() && tries < MAX_SESSION_ATTEMPTS => {
                tracing::warn!(operation, attempt = tries, error = %e, "Session conflicted, retrying");
                tries += 1;
            }
            result => return result,
        }
    }
}
