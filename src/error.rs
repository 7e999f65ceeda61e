use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::domain::{RosterError, TransitionError};
use crate::ports::{GatewayError, RepositoryError};
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage-level write conflict between concurrent sessions. Safe to retry.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Conflict: {0}")]
    SlotConflict(String),

    /// The players a payment covers were already paid for by another transaction.
    #[error("Conflict: {0}")]
    AlreadyFunded(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::SlotConflict(_) | AppError::AlreadyFunded(_) => {
                StatusCode::CONFLICT
            }
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn is_write_conflict(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => AppError::NotFound(what),
            RepositoryError::Conflict(msg) => AppError::Conflict(msg),
            slot @ RepositoryError::SlotTaken(_) => AppError::SlotConflict(slot.to_string()),
            credit @ RepositoryError::InsufficientCredit { .. } => {
                AppError::Validation(credit.to_string())
            }
            RepositoryError::Database(msg) => AppError::Database(msg),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<RosterError> for AppError {
    fn from(err: RosterError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Slot;

    #[test]
    fn test_validation_error_status_code() {
        let error = AppError::Validation("Invalid input".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_not_found_error_status_code() {
        let error = AppError::NotFound("Booking not found".to_string());
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_conflict_status_codes() {
        assert_eq!(
            AppError::Conflict("stale".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::SlotConflict("10:00".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::AlreadyFunded("booking".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert!(!AppError::AlreadyFunded("booking".to_string()).is_write_conflict());
    }

    #[test]
    fn test_unauthorized_error_status_code() {
        let error = AppError::Unauthorized("bad signature".to_string());
        assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_repository_errors_map_to_taxonomy() {
        let slot = Slot::new(10, 0).unwrap();
        let taken: AppError = RepositoryError::SlotTaken(vec![slot]).into();
        assert!(matches!(&taken, AppError::SlotConflict(msg) if msg.contains("10:00")));
        assert!(!taken.is_write_conflict());

        let conflict: AppError = RepositoryError::Conflict("version".to_string()).into();
        assert!(conflict.is_write_conflict());

        let credit: AppError = RepositoryError::InsufficientCredit {
            balance: 50,
            requested: 100,
        }
        .into();
        assert_eq!(credit.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_database_error_response() {
        let error = AppError::Database("connection reset".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_not_found_error_response() {
        let error = AppError::NotFound("Transaction not found".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
