//! Paste JSON API handlers.

use super::request_time::RequestNow;
use crate::{error::HttpError, AppError, AppState};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Path, State},
    http::StatusCode,
    Json,
};
use pastebin_core::models::{CreatePasteResponse, PasteView};
use serde_json::Value;

/// Create a paste from a JSON body.
///
/// The body is read raw (any content type) under the configured size limit
/// and parsed here, so oversize and malformed bodies map to their own errors.
pub async fn create_paste(
    State(state): State<AppState>,
    RequestNow(now): RequestNow,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<CreatePasteResponse>), HttpError> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            HttpError::PayloadTooLarge
        } else {
            HttpError::from(AppError::MalformedBody(rejection.body_text()))
        }
    })?;
    let value: Value = serde_json::from_slice(&body)
        .map_err(|err| AppError::MalformedBody(err.to_string()))?;

    let created = state.service.create_at(&value, now).await?;
    tracing::info!("Created paste {}", created.id);
    Ok((StatusCode::CREATED, Json(created)))
}

/// Read a paste, counting the view.
pub async fn get_paste(
    State(state): State<AppState>,
    Path(id): Path<String>,
    RequestNow(now): RequestNow,
) -> Result<Json<PasteView>, HttpError> {
    let view = state.service.read_at(&id, now).await?;
    Ok(Json(view))
}
