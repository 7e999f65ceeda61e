//! Port implementations.

pub mod gateway;
pub mod memory;
pub mod notifier;
pub mod postgres;

pub use gateway::{GatewayCredentials, HttpPaymentGateway};
pub use memory::{InMemoryChatDirectory, InMemoryStore};
pub use notifier::RegistryNotifier;
pub use postgres::{PostgresChatDirectory, PostgresStore};
