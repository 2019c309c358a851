//! Mutex-guarded in-process store.

use super::{expiry_ms, fresh_counter, KvStore, StoredValue};
use crate::clock::{SharedClock, SystemClock};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// In-memory [`KvStore`]. Contents are lost when the process exits.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredValue>>,
    clock: SharedClock,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryStore {
    /// Create an empty store whose native TTL follows `clock`.
    pub fn new(clock: SharedClock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|map| map.len()).unwrap_or(0)
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, StoredValue>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn now_ms(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    fn bump(
        &self,
        key: &str,
        floor: i64,
        ttl_if_absent: Option<Duration>,
    ) -> Result<i64, StoreError> {
        let now_ms = self.now_ms();
        let mut entries = self.entries()?;
        let current = entries
            .get(key)
            .filter(|stored| !stored.is_expired(now_ms))
            .cloned()
            .unwrap_or_else(|| fresh_counter(now_ms, ttl_if_absent));
        let (next, updated) = current.incremented(key, floor)?;
        entries.insert(key.to_string(), updated);
        Ok(next)
    }

    /// Number of live and expired entries whose key starts with `prefix`.
    #[cfg(any(test, feature = "test-support"))]
    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.entries
            .lock()
            .map(|map| map.keys().filter(|key| key.starts_with(prefix)).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now_ms = self.now_ms();
        let entries = self.entries()?;
        Ok(entries
            .get(key)
            .filter(|stored| !stored.is_expired(now_ms))
            .map(|stored| stored.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries()?.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at_ms: None,
            },
        );
        Ok(())
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let expires_at_ms = expiry_ms(self.now_ms(), ttl);
        self.entries()?.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at_ms: Some(expires_at_ms),
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.bump(key, i64::MIN, None)
    }

    async fn incr_from(
        &self,
        key: &str,
        floor: i64,
        ttl_if_absent: Option<Duration>,
    ) -> Result<i64, StoreError> {
        self.bump(key, floor, ttl_if_absent)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now_ms = self.now_ms();
        let mut entries = self.entries()?;
        match entries.get_mut(key) {
            Some(stored) if !stored.is_expired(now_ms) => {
                stored.expires_at_ms = Some(expiry_ms(now_ms, ttl));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now_ms = self.now_ms();
        let mut entries = self.entries()?;
        let before = entries.len();
        entries.retain(|_, stored| !stored.is_expired(now_ms));
        Ok(before - entries.len())
    }
}
