//! Shared test-only helpers for pastebin crates.
//!
//! Compiled for this crate's unit tests and, through the `test-support`
//! feature, for integration tests of dependent crates.

use crate::clock::{ManualClock, SharedClock};
use crate::error::StoreError;
use crate::kv::{KvClient, KvStore, MemoryStore, RedbStore};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// 2024-01-01T00:00:00Z in epoch milliseconds.
pub const TEST_EPOCH_MS: i64 = 1_704_067_200_000;

/// A manual clock starting at [`TEST_EPOCH_MS`].
pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::at_millis(TEST_EPOCH_MS))
}

/// Creates a redb store in a fresh temp dir.
///
/// Keep the [`TempDir`] alive for the full test to preserve the backing file.
///
/// # Panics
/// Panics if temp-dir creation or store initialization fails.
pub fn setup_temp_redb(clock: SharedClock) -> (RedbStore, TempDir) {
    let temp_dir = TempDir::new().expect("temp dir");
    let path = temp_dir.path().join("test.redb");
    let store = RedbStore::open(&path, clock).expect("open redb store");
    (store, temp_dir)
}

/// A client over a fresh [`MemoryStore`] driven by `clock`.
pub fn memory_client(clock: SharedClock) -> (Arc<KvClient>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new(clock));
    let client = KvClient::from_store(store.clone(), Duration::from_secs(5));
    (Arc::new(client), store)
}

/// Wraps a store and injects failures on demand.
pub struct FaultyStore {
    inner: Arc<dyn KvStore>,
    fail_all: AtomicBool,
    fail_writes: AtomicBool,
    fail_incr: AtomicBool,
    fail_expire: AtomicBool,
    delay: Mutex<Option<Duration>>,
    incr_calls: AtomicU64,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn KvStore>) -> Self {
        Self {
            inner,
            fail_all: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_incr: AtomicBool::new(false),
            fail_expire: AtomicBool::new(false),
            delay: Mutex::new(None),
            incr_calls: AtomicU64::new(0),
        }
    }

    /// Every operation fails.
    pub fn fail_all(&self, enabled: bool) {
        self.fail_all.store(enabled, Ordering::SeqCst);
    }

    /// `set` and `set_with_expiry` fail.
    pub fn fail_writes(&self, enabled: bool) {
        self.fail_writes.store(enabled, Ordering::SeqCst);
    }

    /// `incr` and `incr_from` fail.
    pub fn fail_incr(&self, enabled: bool) {
        self.fail_incr.store(enabled, Ordering::SeqCst);
    }

    /// `expire` fails.
    pub fn fail_expire(&self, enabled: bool) {
        self.fail_expire.store(enabled, Ordering::SeqCst);
    }

    /// Every operation sleeps for `delay` first.
    pub fn set_delay(&self, delay: Option<Duration>) {
        if let Ok(mut guard) = self.delay.lock() {
            *guard = delay;
        }
    }

    /// Number of `incr`/`incr_from` calls seen, failed ones included.
    pub fn incr_calls(&self) -> u64 {
        self.incr_calls.load(Ordering::SeqCst)
    }

    async fn before(&self, flag: Option<&AtomicBool>) -> Result<(), StoreError> {
        let delay = self.delay.lock().ok().and_then(|guard| *guard);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let op_failing = flag.is_some_and(|flag| flag.load(Ordering::SeqCst));
        if self.fail_all.load(Ordering::SeqCst) || op_failing {
            return Err(StoreError::Unavailable("injected fault".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for FaultyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.before(None).await?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.before(Some(&self.fail_writes)).await?;
        self.inner.set(key, value).await
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.before(Some(&self.fail_writes)).await?;
        self.inner.set_with_expiry(key, value, ttl).await
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.incr_calls.fetch_add(1, Ordering::SeqCst);
        self.before(Some(&self.fail_incr)).await?;
        self.inner.incr(key).await
    }

    async fn incr_from(
        &self,
        key: &str,
        floor: i64,
        ttl_if_absent: Option<Duration>,
    ) -> Result<i64, StoreError> {
        self.incr_calls.fetch_add(1, Ordering::SeqCst);
        self.before(Some(&self.fail_incr)).await?;
        self.inner.incr_from(key, floor, ttl_if_absent).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.before(Some(&self.fail_expire)).await?;
        self.inner.expire(key, ttl).await
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        self.before(None).await?;
        self.inner.purge_expired().await
    }
}
