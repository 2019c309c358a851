//! HTTP request handlers.

/// Health check endpoint.
pub mod health;
/// Rendered HTML view of a paste.
pub mod page;
/// Paste JSON API endpoints.
pub mod paste;
/// Per-request "now" extraction.
pub mod request_time;
