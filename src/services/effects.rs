//! Best-effort side effects collected inside a session and dispatched after commit.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::Notification;
use crate::ports::{ChatDirectory, Notifier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    Notify(Notification),
    /// Ensures the booking's chat group exists and contains `members`.
    SyncChat { booking_id: Uuid, members: Vec<Uuid> },
}

#[derive(Clone)]
pub struct EffectDispatcher {
    notifier: Arc<dyn Notifier>,
    chat: Arc<dyn ChatDirectory>,
}

impl EffectDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, chat: Arc<dyn ChatDirectory>) -> Self {
        Self { notifier, chat }
    }

    /// Failures are logged and swallowed; the primary operation has already committed.
    pub async fn dispatch(&self, effects: Vec<SideEffect>) {
        for effect in effects {
            match effect {
                SideEffect::Notify(notification) => {
                    if let Err(e) = self.notifier.notify(&notification).await {
                        tracing::warn!(
                            user_id = %notification.user_id,
                            kind = ?notification.kind,
                            error = %e,
                            "Failed to deliver notification"
                        );
                    }
                }
                SideEffect::SyncChat {
                    booking_id,
                    members,
                } => self.sync_chat(booking_id, &members).await,
            }
        }
    }

    async fn sync_chat(&self, booking_id: Uuid, members: &[Uuid]) {
        if let Err(e) = self.chat.ensure_group(booking_id).await {
            tracing::warn!(%booking_id, error = %e, "Failed to create booking chat group");
            return;
        }

        for member in members {
            match self.chat.add_member(booking_id, *member).await {
                Ok(true) => tracing::debug!(%booking_id, user_id = %member, "Added chat member"),
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    %booking_id,
                    user_id = %member,
                    error = %e,
                    "Failed to add chat member"
                ),
            }
        }
    }
}
