//! Resolves the instant a request is evaluated at.

use crate::AppState;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::{DateTime, Utc};
use pastebin_core::clock::millis_to_datetime;
use std::convert::Infallible;

/// Header carrying a simulated "now" in epoch milliseconds.
pub const TEST_NOW_HEADER: &str = "x-test-now-ms";

/// The instant a request is evaluated at.
///
/// The service clock, unless `TEST_MODE` is on and the request carries a
/// parsable [`TEST_NOW_HEADER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestNow(pub DateTime<Utc>);

#[async_trait]
impl FromRequestParts<AppState> for RequestNow {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if state.config.test_mode {
            let simulated = parts
                .headers
                .get(TEST_NOW_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<i64>().ok());
            if let Some(ms) = simulated {
                return Ok(Self(millis_to_datetime(ms)));
            }
        }
        Ok(Self(state.service.clock().now()))
    }
}
