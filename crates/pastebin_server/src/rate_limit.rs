//! Per-IP fixed-window rate limiting for the paste API.

use crate::AppState;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use pastebin_core::RateDecision;
use serde_json::json;
use std::net::SocketAddr;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

const LIMITED_MESSAGE: &str = "Too many requests. Please try again later.";

/// Identify the client by its peer address.
///
/// With `trust_proxy` set, the first `X-Forwarded-For` hop and then
/// `X-Real-IP` take precedence. Clients can forge both, so only a proxy
/// that overwrites them makes this safe.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> String {
    if trust_proxy {
        if let Some(ip) = forwarded_ip(headers) {
            return ip.to_string();
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<&str> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    forwarded.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    })
}

fn set_numeric(headers: &mut HeaderMap, name: &'static str, value: impl ToString) {
    if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

/// Middleware counting each request against its client's window.
pub async fn enforce(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_ip(request.headers(), peer, state.config.trust_proxy_headers);

    match state.limiter.check(&client).await {
        RateDecision::Allowed {
            limit,
            remaining,
            reset_at,
        } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            set_numeric(headers, LIMIT_HEADER, limit);
            set_numeric(headers, REMAINING_HEADER, remaining);
            set_numeric(headers, RESET_HEADER, reset_at);
            response
        }
        RateDecision::Limited {
            limit,
            retry_after,
            reset_at,
        } => {
            tracing::warn!("Rate limit exceeded for {}", client);
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "error": LIMITED_MESSAGE })),
            )
                .into_response();
            let headers = response.headers_mut();
            set_numeric(headers, "retry-after", retry_after);
            set_numeric(headers, LIMIT_HEADER, limit);
            set_numeric(headers, REMAINING_HEADER, 0);
            set_numeric(headers, RESET_HEADER, reset_at);
            response
        }
    }
}
