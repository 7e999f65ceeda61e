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
use crate::services::{CreateBooking, RequestToJoin, RespondToRequest};
use crate::AppState;

pub async fn create_booking(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Json(mut request): Json<CreateBooking>,
) -> Result<impl IntoResponse, AppError> {
    request.owner_id = caller;
    let booking = state.ledger.create_booking(request, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn get_booking(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let booking = state.ledger.get_booking(id).await?;
    if !booking.visible_to(caller) {
        return Err(AppError::NotFound(format!("Booking {} not found", id)));
    }
    Ok(Json(booking))
}

pub async fn request_to_join(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Path(booking_id): Path<Uuid>,
    Json(mut request): Json<RequestToJoin>,
) -> Result<impl IntoResponse, AppError> {
    request.booking_id = booking_id;
    request.requester_id = caller;
    let created = state.join_requests.request_to_join(request, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn respond_to_request(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Path(request_id): Path<Uuid>,
    Json(mut response): Json<RespondToRequest>,
) -> Result<impl IntoResponse, AppError> {
    response.request_id = request_id;
    response.responder_id = caller;
    let updated = state.join_requests.respond(response, Utc::now()).await?;
    Ok(Json(updated))
}
