use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::db::store::StoreError;
use crate::tracking::TrackingError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Internal server error: {0}")]
    InternalServerError(String),
    #[error(transparent)]
    Tracking(#[from] TrackingError),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "validation", msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            AppError::InternalServerError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "Internal server error".to_string(),
            ),
            AppError::Tracking(e) => {
                let status = match e {
                    TrackingError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                    TrackingError::NoActiveShift => StatusCode::FORBIDDEN,
                    TrackingError::AlreadyActive | TrackingError::TruckInUse => StatusCode::CONFLICT,
                    TrackingError::NotFound(_) => StatusCode::NOT_FOUND,
                    TrackingError::Validation(_) => StatusCode::BAD_REQUEST,
                    TrackingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let message = match e {
                    TrackingError::Store(_) => "Internal server error".to_string(),
                    other => other.to_string(),
                };
                (status, e.code(), message)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error_message) = self.parts();
        if status.is_server_error() {
            error!(error = %self, "Request failed.");
        }
        let retryable = matches!(self, AppError::Tracking(ref e) if e.is_retryable());
        let mut response = (
            status,
            Json(serde_json::json!({
                "error": error_message,
                "code": code,
                "retryable": retryable,
            })),
        )
            .into_response();
        if let AppError::Tracking(TrackingError::RateLimited { retry_after }) = self {
            let seconds = (retry_after.as_secs_f64().ceil() as u64).max(1).to_string();
            if let Ok(value) = HeaderValue::from_str(&seconds) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Tracking(TrackingError::Store(err))
    }
}
