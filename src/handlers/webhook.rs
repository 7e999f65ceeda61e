use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use chrono::Utc;

use crate::error::AppError;
use crate::services::reconciler::SIGNATURE_HEADER;
use crate::services::WebhookAck;
use crate::AppState;

/// Gateway callback. Takes the raw body so the signature is checked over the exact bytes sent.
pub async fn gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    let ack = state.reconciler.handle(&body, signature, Utc::now()).await?;
    Ok(Json(ack))
}
