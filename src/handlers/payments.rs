use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CallerId;
use crate::services::InitiatePayment;
use crate::AppState;

pub async fn initiate_payment(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Path(booking_id): Path<Uuid>,
    Json(mut request): Json<InitiatePayment>,
) -> Result<impl IntoResponse, AppError> {
    request.booking_id = booking_id;
    request.payer_id = caller;
    let intent = state.payments.initiate(request, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(intent)))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let txn = state.payments.get_transaction(id, caller).await?;
    Ok(Json(txn))
}
