//! Configuration loading from environment variables.

use crate::constants::{
    DEFAULT_HEALTH_TIMEOUT_MS, DEFAULT_MAX_BODY_SIZE, DEFAULT_PORT, DEFAULT_PURGE_INTERVAL_SECS,
    DEFAULT_RATE_LIMIT_MAX_REQUESTS, DEFAULT_RATE_LIMIT_WINDOW_SECS,
    DEFAULT_STORE_CONNECT_RETRIES, DEFAULT_STORE_TIMEOUT_MS, REDB_FILE_NAME,
};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which backing store the server talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// Embedded redb file at [`Config::db_path`].
    #[default]
    Redb,
    /// Process-local map; contents vanish on restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "redb" => Ok(Self::Redb),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

/// What a read does when the atomic view increment fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IncrementFallback {
    /// Fetch-modify-store on the record. Racy; view limits become advisory.
    #[default]
    BestEffort,
    /// Fail the read with a store error.
    FailClosed,
}

impl FromStr for IncrementFallback {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "best-effort" => Ok(Self::BestEffort),
            "fail-closed" => Ok(Self::FailClosed),
            other => Err(format!("unknown view count fallback '{}'", other)),
        }
    }
}

/// Runtime configuration for the pastebin server.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Raw `BIND` override; resolved and loopback-checked by the server.
    pub bind: Option<String>,
    pub allow_public_access: bool,
    /// Base for returned paste URLs, without a trailing slash.
    pub base_url: String,
    pub store_backend: StoreBackend,
    pub db_path: String,
    pub store_timeout: Duration,
    pub health_timeout: Duration,
    pub store_connect_retries: u32,
    pub max_body_size: usize,
    pub rate_limit_max_requests: u64,
    pub rate_limit_window_secs: u64,
    /// Key rate limits on `X-Forwarded-For`/`X-Real-IP` instead of the peer
    /// address. Only safe behind a proxy that overwrites those headers.
    pub trust_proxy_headers: bool,
    pub view_count_fallback: IncrementFallback,
    /// Seconds between purges of store-expired entries; 0 disables.
    pub purge_interval_secs: u64,
    /// Honor the `x-test-now-ms` request header.
    pub test_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: None,
            allow_public_access: false,
            base_url: default_base_url(DEFAULT_PORT),
            store_backend: StoreBackend::default(),
            db_path: default_db_path(),
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            health_timeout: Duration::from_millis(DEFAULT_HEALTH_TIMEOUT_MS),
            store_connect_retries: DEFAULT_STORE_CONNECT_RETRIES,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            rate_limit_max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            rate_limit_window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
            trust_proxy_headers: false,
            view_count_fallback: IncrementFallback::default(),
            purge_interval_secs: DEFAULT_PURGE_INTERVAL_SECS,
            test_mode: false,
        }
    }
}

fn default_base_url(port: u16) -> String {
    format!("http://localhost:{}", port)
}

fn default_db_path() -> String {
    let home = resolve_home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".cache")
        .join("pastebin")
        .join(REDB_FILE_NAME)
        .to_string_lossy()
        .to_string()
}

/// Expand tilde (~) in paths to the user's home directory
fn expand_tilde(path: String) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = resolve_home_dir() {
            return home.join(rest).to_string_lossy().to_string();
        }
    }
    path
}

fn resolve_home_dir() -> Option<PathBuf> {
    if let Ok(home) = env::var("HOME") {
        if !home.trim().is_empty() {
            return Some(PathBuf::from(home));
        }
    }

    // Windows
    if let Ok(profile) = env::var("USERPROFILE") {
        if !profile.trim().is_empty() {
            return Some(PathBuf::from(profile));
        }
    }

    std::env::current_dir().ok()
}

/// Parse a boolean-like environment flag value.
///
/// # Supported Values
/// - Truthy: `1`, `true`, `yes`, `on`
/// - Falsy: `0`, `false`, `no`, `off`, empty string
///
/// Matching is case-insensitive and ignores surrounding whitespace.
///
/// # Returns
/// `Some(bool)` when the value is recognized, otherwise `None`.
pub fn parse_env_flag(value: &str) -> Option<bool> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read a boolean flag from the environment.
///
/// Missing or unrecognized values are treated as `false`.
pub fn env_flag_enabled(name: &str) -> bool {
    env::var(name)
        .ok()
        .and_then(|value| parse_env_flag(&value))
        .unwrap_or(false)
}

/// Parse `name` with `FromStr`, warning and falling back on garbage.
fn env_parsed<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("Ignoring invalid {}='{}': {}", name, raw, err);
                default
            }
        },
        _ => default,
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Returns
    /// A populated [`Config`] with defaults applied when env vars are missing
    /// or unparsable.
    pub fn from_env() -> Self {
        let port = env_parsed("PORT", DEFAULT_PORT);
        let base_url = non_empty_var("BASE_URL")
            .unwrap_or_else(|| default_base_url(port))
            .trim_end_matches('/')
            .to_string();

        Self {
            port,
            bind: non_empty_var("BIND"),
            allow_public_access: env_flag_enabled("ALLOW_PUBLIC_ACCESS"),
            base_url,
            store_backend: env_parsed("STORE_BACKEND", StoreBackend::default()),
            db_path: non_empty_var("DB_PATH")
                .map(expand_tilde)
                .unwrap_or_else(default_db_path),
            store_timeout: Duration::from_millis(env_parsed(
                "STORE_TIMEOUT_MS",
                DEFAULT_STORE_TIMEOUT_MS,
            )),
            health_timeout: Duration::from_millis(env_parsed(
                "HEALTH_TIMEOUT_MS",
                DEFAULT_HEALTH_TIMEOUT_MS,
            )),
            store_connect_retries: env_parsed(
                "STORE_CONNECT_RETRIES",
                DEFAULT_STORE_CONNECT_RETRIES,
            ),
            max_body_size: env_parsed("MAX_BODY_SIZE", DEFAULT_MAX_BODY_SIZE),
            rate_limit_max_requests: env_parsed(
                "RATE_LIMIT_MAX_REQUESTS",
                DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            ),
            // A zero-length window would divide by zero.
            rate_limit_window_secs: env_parsed(
                "RATE_LIMIT_WINDOW_SECS",
                DEFAULT_RATE_LIMIT_WINDOW_SECS,
            )
            .max(1),
            trust_proxy_headers: env_flag_enabled("TRUST_PROXY_HEADERS"),
            view_count_fallback: env_parsed("VIEW_COUNT_FALLBACK", IncrementFallback::default()),
            purge_interval_secs: env_parsed("PURGE_INTERVAL_SECS", DEFAULT_PURGE_INTERVAL_SECS),
            test_mode: env_flag_enabled("TEST_MODE"),
        }
    }
}
