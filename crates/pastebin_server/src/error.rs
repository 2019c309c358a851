//! HTTP error mapping for API handlers.

use crate::AppError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Message returned for bodies that are not JSON.
pub const INVALID_JSON_MESSAGE: &str = "Invalid JSON in request body";

/// Error returned by HTTP handlers as `{ "error": string }`.
#[derive(Debug)]
pub enum HttpError {
    App(AppError),
    /// Body exceeded the configured limit before parsing.
    PayloadTooLarge,
}

impl From<AppError> for HttpError {
    fn from(value: AppError) -> Self {
        Self::App(value)
    }
}

impl HttpError {
    /// Status code and client-safe message.
    pub fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large".to_string(),
            ),
            Self::App(AppError::Validation(err)) => (StatusCode::BAD_REQUEST, err.to_string()),
            Self::App(AppError::MalformedBody(_)) => {
                (StatusCode::BAD_REQUEST, INVALID_JSON_MESSAGE.to_string())
            }
            Self::App(AppError::NotFound) => {
                (StatusCode::NOT_FOUND, "Paste not found".to_string())
            }
            Self::App(AppError::Store(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Storage temporarily unavailable".to_string(),
            ),
            Self::App(AppError::Internal(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        match &self {
            HttpError::App(AppError::Store(err)) => tracing::error!("Store error: {}", err),
            HttpError::App(AppError::Internal(msg)) => tracing::error!("Internal error: {}", msg),
            HttpError::App(AppError::MalformedBody(msg)) => {
                tracing::debug!("Rejected malformed body: {}", msg)
            }
            _ => {}
        }

        let (status, message) = self.status_and_message();
        (status, Json(json!({ "error": message }))).into_response()
    }
}
