use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::models::SchedulingError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<SchedulingError> for AppError {
    fn from(e: SchedulingError) -> Self {
        match e {
            SchedulingError::Validation { .. } => AppError::BadRequest(e.to_string()),
            SchedulingError::InvalidSlot(_) => AppError::BadRequest(e.to_string()),
            SchedulingError::Conflict => AppError::Conflict(e.to_string()),
            SchedulingError::NotFound => AppError::NotFound(e.to_string()),
            SchedulingError::ServiceUnavailable(_) => AppError::ServiceUnavailable(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
