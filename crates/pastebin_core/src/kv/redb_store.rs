//! Embedded file-backed store built on redb.
//!
//! Each value is wrapped in a bincode-encoded [`StoredValue`] carrying its
//! absolute expiry. Expired entries read as absent and are physically removed
//! by [`KvStore::purge_expired`]. redb serializes write transactions, which
//! makes the read-modify-write inside `incr` atomic.

use super::{expiry_ms, fresh_counter, KvStore, StoredValue};
use crate::clock::SharedClock;
use crate::error::StoreError;
use async_trait::async_trait;
use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Key/value rows (`StoredValue`, bincode-encoded).
pub const KV: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");

/// redb-backed [`KvStore`].
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<redb::Database>,
    clock: SharedClock,
}

impl RedbStore {
    /// Open (or create) the database file at `path` and initialize tables.
    ///
    /// # Returns
    /// A ready-to-use [`RedbStore`].
    ///
    /// # Errors
    /// Returns an error when the file cannot be opened, for example while
    /// another process holds it.
    pub fn open(path: &Path, clock: SharedClock) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    StoreError::Unavailable(format!(
                        "failed to create store directory {}: {}",
                        parent.display(),
                        err
                    ))
                })?;
            }
        }

        let db = redb::Database::create(path)?;
        let write_txn = db.begin_write()?;
        write_txn.open_table(KV)?;
        write_txn.commit()?;
        Ok(Self {
            db: Arc::new(db),
            clock,
        })
    }

    fn now_ms(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&redb::Database) -> Result<T, StoreError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || op(db.as_ref()))
            .await
            .map_err(|err| StoreError::Unavailable(format!("store task failed: {}", err)))?
    }

    fn write_value(
        db: &redb::Database,
        key: &str,
        stored: &StoredValue,
    ) -> Result<(), StoreError> {
        let encoded = bincode::serialize(stored)?;
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(KV)?;
            table.insert(key, encoded.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Shared body of `incr` and `incr_from`, in one write transaction.
    async fn bump(
        &self,
        key: &str,
        floor: i64,
        ttl_if_absent: Option<Duration>,
    ) -> Result<i64, StoreError> {
        let key = key.to_string();
        let now_ms = self.now_ms();
        self.run_blocking(move |db| {
            let write_txn = db.begin_write()?;
            let next = {
                let mut table = write_txn.open_table(KV)?;
                let current = match table.get(key.as_str())? {
                    Some(guard) => Some(decode(guard.value())?),
                    None => None,
                };
                let current = current
                    .filter(|stored| !stored.is_expired(now_ms))
                    .unwrap_or_else(|| fresh_counter(now_ms, ttl_if_absent));
                let (next, updated) = current.incremented(&key, floor)?;
                let encoded = bincode::serialize(&updated)?;
                table.insert(key.as_str(), encoded.as_slice())?;
                next
            };
            write_txn.commit()?;
            Ok(next)
        })
        .await
    }
}

fn decode(bytes: &[u8]) -> Result<StoredValue, StoreError> {
    Ok(bincode::deserialize(bytes)?)
}

#[async_trait]
impl KvStore for RedbStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = key.to_string();
        let now_ms = self.now_ms();
        self.run_blocking(move |db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(KV)?;
            let Some(guard) = table.get(key.as_str())? else {
                return Ok(None);
            };
            let stored = decode(guard.value())?;
            if stored.is_expired(now_ms) {
                return Ok(None);
            }
            Ok(Some(stored.value))
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        let stored = StoredValue {
            value: value.to_string(),
            expires_at_ms: None,
        };
        self.run_blocking(move |db| Self::write_value(db, &key, &stored))
            .await
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let key = key.to_string();
        let stored = StoredValue {
            value: value.to_string(),
            expires_at_ms: Some(expiry_ms(self.now_ms(), ttl)),
        };
        self.run_blocking(move |db| Self::write_value(db, &key, &stored))
            .await
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.bump(key, i64::MIN, None).await
    }

    async fn incr_from(
        &self,
        key: &str,
        floor: i64,
        ttl_if_absent: Option<Duration>,
    ) -> Result<i64, StoreError> {
        self.bump(key, floor, ttl_if_absent).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let key = key.to_string();
        let now_ms = self.now_ms();
        self.run_blocking(move |db| {
            let write_txn = db.begin_write()?;
            let updated = {
                let mut table = write_txn.open_table(KV)?;
                let current = match table.get(key.as_str())? {
                    Some(guard) => Some(decode(guard.value())?),
                    None => None,
                };
                match current {
                    Some(mut stored) if !stored.is_expired(now_ms) => {
                        stored.expires_at_ms = Some(expiry_ms(now_ms, ttl));
                        let encoded = bincode::serialize(&stored)?;
                        table.insert(key.as_str(), encoded.as_slice())?;
                        true
                    }
                    _ => false,
                }
            };
            write_txn.commit()?;
            Ok(updated)
        })
        .await
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now_ms = self.now_ms();
        self.run_blocking(move |db| {
            let write_txn = db.begin_write()?;
            let removed = {
                let mut table = write_txn.open_table(KV)?;
                let mut expired_keys = Vec::new();
                for entry in table.iter()? {
                    let (key, value) = entry?;
                    // Undecodable rows are skipped, not purged.
                    if let Ok(stored) = decode(value.value()) {
                        if stored.is_expired(now_ms) {
                            expired_keys.push(key.value().to_string());
                        }
                    }
                }
                for key in &expired_keys {
                    table.remove(key.as_str())?;
                }
                expired_keys.len()
            };
            write_txn.commit()?;
            Ok(removed)
        })
        .await
    }
}
