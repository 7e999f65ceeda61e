pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod ports;
pub mod services;
pub mod utils;
pub mod validation;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;

use crate::health::DependencyChecker;
use crate::ports::{ChatDirectory, Notifier, PaymentGateway, Store};
use crate::services::{
    CancellationService, ConnectionRegistry, CreditLedger, EffectDispatcher, JoinRequestService,
    PaymentService, Reaper, SlotLedger, WebhookReconciler,
};

/// Storage and outbound collaborators the services are built over.
pub struct Collaborators {
    pub store: Arc<dyn Store>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub chat: Arc<dyn ChatDirectory>,
    pub notifier: Arc<dyn Notifier>,
    pub registry: Arc<ConnectionRegistry>,
}

pub struct Settings {
    pub currency: String,
    pub webhook_secret: String,
    pub admin_api_key: String,
    pub reaper_stale_after: chrono::Duration,
}

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<SlotLedger>,
    pub payments: Arc<PaymentService>,
    pub credit: Arc<CreditLedger>,
    pub reconciler: Arc<WebhookReconciler>,
    pub cancellations: Arc<CancellationService>,
    pub reaper: Arc<Reaper>,
    pub join_requests: Arc<JoinRequestService>,
    pub registry: Arc<ConnectionRegistry>,
    pub checkers: Arc<Vec<Arc<dyn DependencyChecker>>>,
    pub admin_api_key: Arc<str>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(collaborators: Collaborators, settings: Settings) -> Self {
        let Collaborators {
            store,
            gateway,
            chat,
            notifier,
            registry,
        } = collaborators;
        let effects = EffectDispatcher::new(notifier, chat);

        Self {
            ledger: Arc::new(SlotLedger::new(store.clone())),
            payments: Arc::new(PaymentService::new(
                store.clone(),
                gateway,
                effects.clone(),
                settings.currency,
                settings.reaper_stale_after,
            )),
            credit: Arc::new(CreditLedger::new(store.clone(), effects.clone())),
            reconciler: Arc::new(WebhookReconciler::new(
                store.clone(),
                effects.clone(),
                settings.webhook_secret,
            )),
            cancellations: Arc::new(CancellationService::new(store.clone(), effects.clone())),
            reaper: Arc::new(Reaper::new(store.clone(), settings.reaper_stale_after)),
            join_requests: Arc::new(JoinRequestService::new(store, effects)),
            registry,
            checkers: Arc::new(Vec::new()),
            admin_api_key: Arc::from(settings.admin_api_key),
            started_at: Instant::now(),
        }
    }

    pub fn with_checkers(mut self, checkers: Vec<Arc<dyn DependencyChecker>>) -> Self {
        self.checkers = Arc::new(checkers);
        self
    }
}

pub fn create_app(state: AppState) -> Router {
    let admin = Router::new()
        .route(
            "/admin/bookings/:id/cancel",
            post(handlers::admin::cancel_booking),
        )
        .route("/admin/reaper/run", post(handlers::admin::run_reaper))
        .route("/admin/credit/:user_id", post(handlers::admin::grant_credit))
        .route(
            "/admin/transactions/:id/gateway-refund",
            post(handlers::admin::gateway_refund),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::admin_auth,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ws", get(handlers::ws::ws_handler))
        .route("/bookings", post(handlers::bookings::create_booking))
        .route("/bookings/:id", get(handlers::bookings::get_booking))
        .route(
            "/bookings/:id/payments",
            post(handlers::payments::initiate_payment),
        )
        .route(
            "/bookings/:id/requests",
            post(handlers::bookings::request_to_join),
        )
        .route(
            "/booking-requests/:id/respond",
            post(handlers::bookings::respond_to_request),
        )
        .route("/transactions/:id", get(handlers::payments::get_transaction))
        .route("/credit", get(handlers::credit::get_credit))
        .route("/webhooks/gateway", post(handlers::webhook::gateway_webhook))
        .merge(admin)
        .layer(axum::middleware::from_fn(
            middleware::request_logger_middleware,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
