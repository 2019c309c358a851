//! Paste lifecycle rules: validation, id assignment, expiry and availability.
//!
//! Everything here is pure and synchronous. "Now" is always passed in, so the
//! rules can be exercised against any instant.

use crate::constants::{MAX_CONTENT_BYTES, MAX_TTL_SECONDS, MAX_VIEWS};
use crate::error::ValidationError;
use crate::models::paste::{CreatePasteRequest, Paste};
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;


/// Validate a raw create body.
///
/// Rules are checked in order and the first failure wins:
/// 1. `content` is a string of 1..=[`MAX_CONTENT_BYTES`] bytes.
/// 2. `ttl_seconds`, when present, is an integer in 1..=[`MAX_TTL_SECONDS`].
/// 3. `max_views`, when present, is an integer in 1..=[`MAX_VIEWS`].
///
/// Unknown fields are ignored. An explicit `null` counts as present and is
/// rejected like any other non-number.
///
/// # Returns
/// The validated request.
///
/// # Errors
/// Returns a [`ValidationError`] naming the offending field.
pub fn validate(body: &Value) -> Result<CreatePasteRequest, ValidationError> {
    let Value::Object(fields) = body else {
        return Err(ValidationError::new(
            "body",
            format!("Expected object, received {}", json_kind(body)),
        ));
    };

    let content = validate_content(fields)?;
    let ttl_seconds = validate_bounded_integer(fields, "ttl_seconds", MAX_TTL_SECONDS)?;
    let max_views = validate_bounded_integer(fields, "max_views", MAX_VIEWS)?;

    Ok(CreatePasteRequest {
        content,
        ttl_seconds,
        max_views,
    })
}

fn validate_content(fields: &Map<String, Value>) -> Result<String, ValidationError> {
    match fields.get("content") {
        None => Err(ValidationError::new("content", "Required")),
        Some(Value::String(content)) if content.is_empty() => Err(ValidationError::new(
            "content",
            "Content must be a non-empty string",
        )),
        Some(Value::String(content)) if content.len() > MAX_CONTENT_BYTES => Err(
            ValidationError::new("content", "Content cannot exceed 10MB"),
        ),
        Some(Value::String(content)) => Ok(content.clone()),
        Some(other) => Err(ValidationError::new(
            "content",
            format!("Expected string, received {}", json_kind(other)),
        )),
    }
}

fn validate_bounded_integer(
    fields: &Map<String, Value>,
    field: &'static str,
    max: u64,
) -> Result<Option<u64>, ValidationError> {
    let Some(value) = fields.get(field) else {
        return Ok(None);
    };
    let Value::Number(number) = value else {
        return Err(ValidationError::new(
            field,
            format!("Expected number, received {}", json_kind(value)),
        ));
    };

    let too_small = || ValidationError::new(field, "Number must be greater than or equal to 1");
    let too_large =
        || ValidationError::new(field, format!("Number must be less than or equal to {}", max));

    let parsed = if let Some(unsigned) = number.as_u64() {
        unsigned
    } else if number.as_i64().is_some() {
        // Only negatives fail `as_u64` but pass `as_i64`.
        return Err(too_small());
    } else {
        let float = number.as_f64().unwrap_or(f64::NAN);
        if !float.is_finite() || float.fract() != 0.0 {
            return Err(ValidationError::new(field, "Expected integer, received float"));
        }
        if float < 1.0 {
            return Err(too_small());
        }
        if float > max as f64 {
            return Err(too_large());
        }
        float as u64
    };

    if parsed < 1 {
        return Err(too_small());
    }
    if parsed > max {
        return Err(too_large());
    }
    Ok(Some(parsed))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Generate a new random paste id (UUID v4).
///
/// Uniqueness is not checked against storage; 122 random bits make a
/// collision negligible.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Whether `id` has the shape of an id produced by [`generate_id`].
pub fn is_paste_id(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

/// Absolute expiry for a paste created at `now`.
///
/// # Returns
/// `None` when no TTL was requested, otherwise `now + ttl_seconds`.
pub fn compute_expires_at(ttl_seconds: Option<u64>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let ttl = i64::try_from(ttl_seconds?).ok()?;
    now.checked_add_signed(Duration::seconds(ttl))
}

/// Build the initial record for a validated request.
pub fn new_paste(request: CreatePasteRequest, id: String, now: DateTime<Utc>) -> Paste {
    Paste {
        id,
        expires_at: compute_expires_at(request.ttl_seconds, now),
        content: request.content,
        created_at: now.timestamp_millis(),
        ttl_seconds: request.ttl_seconds,
        max_views: request.max_views,
        view_count: 0,
    }
}

/// A paste is expired once `now` reaches `expires_at`; the valid window is
/// `[created_at, expires_at)`.
pub fn is_expired(paste: &Paste, now: DateTime<Utc>) -> bool {
    match paste.expires_at {
        Some(expires_at) => now >= expires_at,
        None => false,
    }
}

/// Whether the view budget is spent.
pub fn is_view_limit_exceeded(paste: &Paste) -> bool {
    match paste.max_views {
        Some(max_views) => paste.view_count >= max_views,
        None => false,
    }
}

/// Whether the paste may be served at `now`.
pub fn is_available(paste: &Paste, now: DateTime<Utc>) -> bool {
    !is_expired(paste, now) && !is_view_limit_exceeded(paste)
}

/// Views left after `view_count` reads, clamped at zero. `None` when unlimited.
pub fn remaining_views(max_views: Option<u64>, view_count: u64) -> Option<u64> {
    max_views.map(|max| max.saturating_sub(view_count))
}

/// Whole seconds until expiry, rounded up.
///
/// # Returns
/// `None` for pastes without a TTL, `Some(0)` once expired.
pub fn remaining_ttl_seconds(paste: &Paste, now: DateTime<Utc>) -> Option<u64> {
    let expires_at = paste.expires_at?;
    let remaining_ms = expires_at.signed_duration_since(now).num_milliseconds();
    if remaining_ms <= 0 {
        return Some(0);
    }
    let remaining_ms = remaining_ms as u64;
    Some(remaining_ms.div_ceil(1000))
}
