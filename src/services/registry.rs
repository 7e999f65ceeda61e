//! Live WebSocket connections keyed by user.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tokio::sync::mpsc;
use uuid::Uuid;

pub type Outbox = mpsc::UnboundedReceiver<String>;

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<Uuid, HashMap<Uuid, mpsc::UnboundedSender<String>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection for `user_id`. Returns its id and the receiving end of its outbox.
    pub fn register(&self, user_id: Uuid) -> (Uuid, Outbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection_id = Uuid::new_v4();
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user_id)
            .or_default()
            .insert(connection_id, tx);

        tracing::debug!(%user_id, %connection_id, "Connection registered");
        (connection_id, rx)
    }

    pub fn unregister(&self, user_id: Uuid, connection_id: Uuid) {
        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(user_connections) = connections.get_mut(&user_id) {
            user_connections.remove(&connection_id);
            if user_connections.is_empty() {
                connections.remove(&user_id);
            }
        }
        tracing::debug!(%user_id, %connection_id, "Connection unregistered");
    }

    /// Queues `message` on every open connection of `user_id`.
    /// Returns how many connections accepted it; zero when the user is offline.
    pub fn send_if_present(&self, user_id: Uuid, message: &str) -> usize {
        let connections = self
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        connections
            .get(&user_id)
            .map(|user_connections| {
                user_connections
                    .values()
                    .filter(|tx| tx.send(message.to_string()).is_ok())
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn connection_count(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(HashMap::len)
            .sum()
    }
}
