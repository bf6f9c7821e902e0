use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;

pub type Result<T, E = AttendanceError> = std::result::Result<T, E>;

/// Failures surfaced by the attendance engine.
///
/// Every variant maps onto one HTTP status through [`ResponseError`], so
/// handlers can propagate engine results with `?`.
#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Member membership is not active")]
    NotEligible,
    #[error("Member is already checked in")]
    AlreadyPresent,
    #[error("No active check-in found for today")]
    NoOpenSession,
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl From<sqlx::Error> for AttendanceError {
    fn from(err: sqlx::Error) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

impl ResponseError for AttendanceError {
    fn status_code(&self) -> StatusCode {
        match self {
            AttendanceError::NotFound(_) | AttendanceError::NoOpenSession => StatusCode::NOT_FOUND,
            AttendanceError::NotEligible
            | AttendanceError::AlreadyPresent
            | AttendanceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AttendanceError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Storage details are logged where they happen, not echoed to clients.
        let message = match self {
            AttendanceError::StorageUnavailable(_) => "Service temporarily unavailable".to_string(),
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(json!({ "message": message }))
    }
}
