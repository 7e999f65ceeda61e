use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::Notification;
use crate::ports::Notifier;
use crate::services::registry::ConnectionRegistry;

/// In-app notifications pushed over the user's open WebSocket connections.
#[derive(Clone)]
pub struct RegistryNotifier {
    registry: Arc<ConnectionRegistry>,
}

impl RegistryNotifier {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Notifier for RegistryNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        let message = serde_json::to_string(notification)?;
        let delivered = self
            .registry
            .send_if_present(notification.user_id, &message);

        if delivered == 0 {
            tracing::debug!(
                user_id = %notification.user_id,
                kind = ?notification.kind,
                "User offline, notification not delivered"
            );
        }

        Ok(())
    }
}
