//! Store client owning the connection to the backing store.

use super::{KvStore, RedbStore};
use crate::clock::SharedClock;
use crate::constants::DEFAULT_STORE_CONNECT_RETRIES;
use crate::error::StoreError;
use async_trait::async_trait;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Produces live store handles.
#[async_trait]
pub trait KvConnector: Send + Sync + 'static {
    /// Establish a new handle to the store.
    async fn connect(&self) -> Result<Arc<dyn KvStore>, StoreError>;

    /// Human-readable target for logs.
    fn describe(&self) -> String;
}

/// Opens a [`RedbStore`] file.
pub struct RedbConnector {
    path: PathBuf,
    clock: SharedClock,
}

impl RedbConnector {
    pub fn new(path: impl Into<PathBuf>, clock: SharedClock) -> Self {
        Self {
            path: path.into(),
            clock,
        }
    }
}

#[async_trait]
impl KvConnector for RedbConnector {
    async fn connect(&self) -> Result<Arc<dyn KvStore>, StoreError> {
        let path = self.path.clone();
        let clock = self.clock.clone();
        let store = tokio::task::spawn_blocking(move || RedbStore::open(&path, clock))
            .await
            .map_err(|err| StoreError::Unavailable(format!("store open task failed: {}", err)))??;
        Ok(Arc::new(store))
    }

    fn describe(&self) -> String {
        format!("redb:{}", self.path.display())
    }
}

/// Hands out one pre-built store. Used for the in-memory backend and tests.
pub struct StaticConnector {
    store: Arc<dyn KvStore>,
}

impl StaticConnector {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl KvConnector for StaticConnector {
    async fn connect(&self) -> Result<Arc<dyn KvStore>, StoreError> {
        Ok(self.store.clone())
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

/// Bounded retry schedule for (re)connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Delay added per attempt.
    pub step: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_STORE_CONNECT_RETRIES,
            step: Duration::from_millis(100),
            max_delay: Duration::from_secs(3),
        }
    }
}

impl ReconnectPolicy {
    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based): `min(attempt * step, max_delay)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt).min(self.max_delay)
    }
}

/// Connect with the bounded retry schedule of `policy`.
///
/// # Errors
/// Returns the last connect error once retries are exhausted.
pub async fn connect_with_retry(
    connector: &dyn KvConnector,
    policy: &ReconnectPolicy,
) -> Result<Arc<dyn KvStore>, StoreError> {
    let mut attempt = 0u32;
    loop {
        match connector.connect().await {
            Ok(store) => {
                if attempt > 0 {
                    info!(
                        "Connected to store {} after {} retries",
                        connector.describe(),
                        attempt
                    );
                }
                return Ok(store);
            }
            Err(err) if attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.delay_for(attempt);
                warn!(
                    "Store {} connect failed ({}); retry {}/{} in {:?}",
                    connector.describe(),
                    err,
                    attempt,
                    policy.max_retries,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                error!(
                    "Store {} connect failed after {} retries: {}",
                    connector.describe(),
                    attempt,
                    err
                );
                return Err(err);
            }
        }
    }
}

/// Dependency-injected store client.
///
/// Holds the current store handle, reconnects through its [`KvConnector`]
/// when an operation reports connection loss, and bounds every operation by
/// `op_timeout`. A timed-out operation is abandoned, never retried.
pub struct KvClient {
    connector: Arc<dyn KvConnector>,
    handle: RwLock<Option<Arc<dyn KvStore>>>,
    policy: ReconnectPolicy,
    op_timeout: Duration,
}

impl KvClient {
    /// Connect eagerly, retrying per `policy`.
    ///
    /// # Errors
    /// Returns the connect error when every attempt fails.
    pub async fn connect(
        connector: Arc<dyn KvConnector>,
        policy: ReconnectPolicy,
        op_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let store = connect_with_retry(connector.as_ref(), &policy).await?;
        Ok(Self {
            connector,
            handle: RwLock::new(Some(store)),
            policy,
            op_timeout,
        })
    }

    /// Wrap an already-open store. Reconnects hand back the same store.
    pub fn from_store(store: Arc<dyn KvStore>, op_timeout: Duration) -> Self {
        Self {
            connector: Arc::new(StaticConnector::new(store.clone())),
            handle: RwLock::new(Some(store)),
            policy: ReconnectPolicy::no_retry(),
            op_timeout,
        }
    }

    /// Per-operation timeout.
    pub fn op_timeout(&self) -> Duration {
        self.op_timeout
    }

    /// Whether a live handle is currently held.
    pub async fn is_connected(&self) -> bool {
        self.handle.read().await.is_some()
    }

    /// Drop the current handle and connect again.
    ///
    /// # Errors
    /// Returns the connect error when every attempt fails; the client stays
    /// disconnected and the next operation tries again.
    pub async fn reconnect(&self) -> Result<(), StoreError> {
        let mut handle = self.handle.write().await;
        *handle = None;
        let store = connect_with_retry(self.connector.as_ref(), &self.policy).await?;
        *handle = Some(store);
        Ok(())
    }

    async fn store(&self) -> Result<Arc<dyn KvStore>, StoreError> {
        if let Some(store) = self.handle.read().await.as_ref() {
            return Ok(store.clone());
        }

        let mut handle = self.handle.write().await;
        // Another caller may have reconnected while we waited for the lock.
        if let Some(store) = handle.as_ref() {
            return Ok(store.clone());
        }
        debug!("Reconnecting to store {}", self.connector.describe());
        let store = connect_with_retry(self.connector.as_ref(), &self.policy).await?;
        *handle = Some(store.clone());
        Ok(store)
    }

    async fn invalidate(&self) {
        let mut handle = self.handle.write().await;
        if handle.take().is_some() {
            warn!(
                "Dropped store handle for {}; next operation reconnects",
                self.connector.describe()
            );
        }
    }

    async fn timed<T>(
        &self,
        op: &'static str,
        limit: Duration,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(limit, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                if err.is_connection_loss() {
                    self.invalidate().await;
                }
                Err(err)
            }
            Err(_) => {
                warn!("Store {} timed out after {:?}", op, limit);
                Err(StoreError::Timeout(limit))
            }
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.timed("get", self.op_timeout, async {
            self.store().await?.get(key).await
        })
        .await
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.timed("set", self.op_timeout, async {
            self.store().await?.set(key, value).await
        })
        .await
    }

    pub async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.timed("set_with_expiry", self.op_timeout, async {
            self.store().await?.set_with_expiry(key, value, ttl).await
        })
        .await
    }

    pub async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.timed("incr", self.op_timeout, async {
            self.store().await?.incr(key).await
        })
        .await
    }

    pub async fn incr_from(
        &self,
        key: &str,
        floor: i64,
        ttl_if_absent: Option<Duration>,
    ) -> Result<i64, StoreError> {
        self.timed("incr_from", self.op_timeout, async {
            self.store()
                .await?
                .incr_from(key, floor, ttl_if_absent)
                .await
        })
        .await
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.timed("expire", self.op_timeout, async {
            self.store().await?.expire(key, ttl).await
        })
        .await
    }

    pub async fn purge_expired(&self) -> Result<usize, StoreError> {
        self.timed("purge_expired", self.op_timeout, async {
            self.store().await?.purge_expired().await
        })
        .await
    }

    /// Trivial read of `key` under its own timeout.
    ///
    /// # Returns
    /// `true` when the store answered in time.
    pub async fn ping(&self, key: &str, limit: Duration) -> bool {
        match self
            .timed("ping", limit, async { self.store().await?.get(key).await })
            .await
        {
            Ok(_) => true,
            Err(err) => {
                warn!("Store health check failed: {}", err);
                false
            }
        }
    }
}
