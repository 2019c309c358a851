//! Shared constants used across pastebin crates.

/// Default API port.
pub const DEFAULT_PORT: u16 = 3000;

/// Largest accepted paste content, in bytes.
pub const MAX_CONTENT_BYTES: usize = 10 * 1024 * 1024;

/// Largest accepted `ttl_seconds` (365 days).
pub const MAX_TTL_SECONDS: u64 = 31_536_000;

/// Largest accepted `max_views`.
pub const MAX_VIEWS: u64 = 1_000_000;

/// Allowance for JSON framing and escaping on top of [`MAX_CONTENT_BYTES`].
pub const BODY_ENVELOPE_ALLOWANCE: usize = 64 * 1024;

/// Default request body limit enforced before JSON parsing.
pub const DEFAULT_MAX_BODY_SIZE: usize = MAX_CONTENT_BYTES + BODY_ENVELOPE_ALLOWANCE;

/// Default per-operation store timeout in milliseconds.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;

/// Default health-check store timeout in milliseconds.
pub const DEFAULT_HEALTH_TIMEOUT_MS: u64 = 1_000;

/// Default bounded reconnect attempts for the store client.
pub const DEFAULT_STORE_CONNECT_RETRIES: u32 = 10;

/// Default fixed-window rate limit (requests per window per client).
pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u64 = 100;
/// Default fixed-window length in seconds.
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Default interval between sweeps of store-expired entries.
pub const DEFAULT_PURGE_INTERVAL_SECS: u64 = 300;

/// Default base URL for CLI/API clients.
pub const DEFAULT_CLI_SERVER_URL: &str = "http://localhost:3000";

/// Key namespace for paste records.
pub const PASTE_KEY_PREFIX: &str = "paste:";
/// Suffix of the per-paste atomic view counter key.
pub const VIEWS_KEY_SUFFIX: &str = ":views";
/// Key namespace for rate limit counters.
pub const RATE_LIMIT_KEY_PREFIX: &str = "rate_limit:";
/// Key read by the health check; never written.
pub const HEALTH_CHECK_KEY: &str = "__health_check__";

/// Default redb database file name under the cache directory.
pub const REDB_FILE_NAME: &str = "data.redb";
