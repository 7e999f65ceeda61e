use axum::{extract::State, response::IntoResponse, Json};

use crate::error::AppError;
use crate::middleware::CallerId;
use crate::AppState;

pub async fn get_credit(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
) -> Result<impl IntoResponse, AppError> {
    let summary = state.credit.summary(caller).await?;
    Ok(Json(summary))
}
