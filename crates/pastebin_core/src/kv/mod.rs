//! Key-value store adapter.
//!
//! [`KvStore`] is the abstract surface the service needs from its backing
//! store. [`KvClient`] owns a connection to one, reconnects it when lost and
//! bounds every call with a timeout.

/// Store client with connect/reconnect lifecycle and timeouts.
pub mod client;
/// In-process backend.
pub mod memory;
/// Embedded redb backend.
pub mod redb_store;


pub use client::{KvClient, KvConnector, ReconnectPolicy, RedbConnector, StaticConnector};
pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use crate::constants::{PASTE_KEY_PREFIX, RATE_LIMIT_KEY_PREFIX, VIEWS_KEY_SUFFIX};
use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Operations required from the backing key-value store.
///
/// Expiry is the store's own ("native TTL"): an expired key reads as absent.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Fetch a value, `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store a value without expiry, replacing any previous value and expiry.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Store a value that expires after `ttl`.
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration)
        -> Result<(), StoreError>;

    /// Atomically add one to an integer value and return the new value.
    ///
    /// An absent key starts from zero without expiry; an existing expiry is
    /// kept. Concurrent increments are serialized and none are lost.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Atomically raise an integer value to at least `floor`, add one and
    /// return the new value.
    ///
    /// A key created by this call gets `ttl_if_absent` as its expiry; an
    /// existing expiry is kept.
    async fn incr_from(
        &self,
        key: &str,
        floor: i64,
        ttl_if_absent: Option<Duration>,
    ) -> Result<i64, StoreError>;

    /// Set the expiry of an existing key. Returns `false` when absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Physically remove expired entries, returning how many were dropped.
    async fn purge_expired(&self) -> Result<usize, StoreError>;
}

/// Stored value plus its absolute expiry, shared by the bundled backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredValue {
    pub value: String,
    pub expires_at_ms: Option<i64>,
}

impl StoredValue {
    pub(crate) fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms.is_some_and(|at| now_ms >= at)
    }

    /// `max(value, floor) + 1`, keeping the expiry.
    pub(crate) fn incremented(
        &self,
        key: &str,
        floor: i64,
    ) -> Result<(i64, StoredValue), StoreError> {
        let current: i64 = self
            .value
            .trim()
            .parse()
            .map_err(|_| StoreError::NotAnInteger {
                key: key.to_string(),
            })?;
        let next = current
            .max(floor)
            .checked_add(1)
            .ok_or_else(|| StoreError::NotAnInteger {
                key: key.to_string(),
            })?;
        Ok((
            next,
            StoredValue {
                value: next.to_string(),
                expires_at_ms: self.expires_at_ms,
            },
        ))
    }
}

/// Starting point for a counter that does not exist yet.
pub(crate) fn fresh_counter(now_ms: i64, ttl: Option<Duration>) -> StoredValue {
    StoredValue {
        value: "0".to_string(),
        expires_at_ms: ttl.map(|ttl| expiry_ms(now_ms, ttl)),
    }
}

pub(crate) fn expiry_ms(now_ms: i64, ttl: Duration) -> i64 {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now_ms.saturating_add(ttl_ms)
}

/// Record key for a paste id.
pub fn paste_key(id: &str) -> String {
    format!("{}{}", PASTE_KEY_PREFIX, id)
}

/// Atomic view counter key for a paste id.
pub fn views_key(id: &str) -> String {
    format!("{}{}{}", PASTE_KEY_PREFIX, id, VIEWS_KEY_SUFFIX)
}

/// Fixed-window rate limit counter key.
pub fn rate_limit_key(client: &str, window: i64) -> String {
    format!("{}{}:{}", RATE_LIMIT_KEY_PREFIX, client, window)
}
