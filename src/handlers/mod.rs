pub mod admin;
pub mod bookings;
pub mod credit;
pub mod payments;
pub mod webhook;
pub mod ws;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::health::check_health;
use crate::AppState;

/// Database connectivity and pool usage; 503 when a critical dependency is down.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let report = check_health(&state.checkers, state.started_at).await;
    let status_code = if report.status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status_code, Json(report))
}
