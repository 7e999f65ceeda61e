use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::CancelBooking;
use crate::validation::{sanitize_string, validate_max_len, validate_positive_amount};
use crate::AppState;

const NOTE_MAX_LEN: usize = 200;

#[derive(Debug, Deserialize)]
pub struct GrantCredit {
    pub amount: i64,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct GatewayRefundRequest {
    #[serde(default)]
    pub amount: Option<i64>,
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(mut request): Json<CancelBooking>,
) -> Result<impl IntoResponse, AppError> {
    request.booking_id = booking_id;
    let summary = state.cancellations.cancel(request, Utc::now()).await?;
    Ok(Json(summary))
}

pub async fn run_reaper(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let abandoned = state.reaper.sweep(Utc::now()).await?;
    Ok(Json(json!({ "abandoned": abandoned })))
}

pub async fn grant_credit(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<GrantCredit>,
) -> Result<impl IntoResponse, AppError> {
    validate_positive_amount("amount", request.amount)?;
    let note = sanitize_string(request.note.as_deref().unwrap_or("manual adjustment"));
    validate_max_len("note", &note, NOTE_MAX_LEN)?;

    let summary = state
        .credit
        .grant(user_id, request.amount, &note, Utc::now())
        .await?;
    Ok(Json(summary))
}

pub async fn gateway_refund(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
    Json(request): Json<GatewayRefundRequest>,
) -> Result<impl IntoResponse, AppError> {
    let refund = state
        .payments
        .request_gateway_refund(transaction_id, request.amount)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(refund)))
}
