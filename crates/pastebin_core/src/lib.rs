//! Core domain library for the pastebin service (lifecycle rules, storage,
//! paste service, rate limiting, config).

/// Injectable time source.
pub mod clock;
/// Configuration loading and defaults.
pub mod config;
/// Shared constants.
pub mod constants;
/// Environment mutation helpers for tests.
pub mod env;
/// Application error types (store/domain).
pub mod error;
/// Key-value store adapter, backends and client.
pub mod kv;
/// Validation, expiry and availability rules.
pub mod lifecycle;
/// Data models for API requests and persistence.
pub mod models;
/// Fixed-window rate limiting.
pub mod rate_limit;
/// Paste create/read orchestration.
pub mod service;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{Config, IncrementFallback, StoreBackend};
pub use constants::DEFAULT_PORT;
pub use error::{AppError, StoreError, ValidationError};
pub use kv::{KvClient, KvStore};
pub use rate_limit::{FixedWindowLimiter, RateDecision};
pub use service::PasteService;
