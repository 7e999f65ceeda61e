pub mod auth;
pub mod identity;
pub mod request_logger;

pub use auth::admin_auth;
pub use identity::CallerId;
pub use request_logger::request_logger_middleware;
