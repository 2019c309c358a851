//! Paste create/read orchestration over the store client.
//!
//! The service composes the lifecycle rules with [`KvClient`]. It keeps no
//! state between requests; every read fetches the record afresh and all
//! cross-request coordination goes through the store's atomic increment.

use crate::clock::SharedClock;
use crate::config::IncrementFallback;
use crate::error::AppError;
use crate::kv::{paste_key, views_key, KvClient};
use crate::lifecycle;
use crate::models::{CreatePasteResponse, Paste, PasteView};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};


/// Create and read pastes.
#[derive(Clone)]
pub struct PasteService {
    kv: Arc<KvClient>,
    clock: SharedClock,
    base_url: String,
    fallback: IncrementFallback,
}

impl PasteService {
    /// Build a service over `kv`, reading "now" from `clock`.
    ///
    /// # Arguments
    /// - `base_url`: Prefix for returned paste URLs; a trailing `/` is dropped.
    pub fn new(kv: Arc<KvClient>, clock: SharedClock, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            kv,
            clock,
            base_url,
            fallback: IncrementFallback::default(),
        }
    }

    /// Choose what a read does when the atomic increment fails.
    pub fn with_fallback(mut self, fallback: IncrementFallback) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn kv(&self) -> &Arc<KvClient> {
        &self.kv
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Shareable URL for `id`.
    pub fn paste_url(&self, id: &str) -> String {
        format!("{}/p/{}", self.base_url, id)
    }

    /// Validate and persist a new paste.
    ///
    /// # Errors
    /// [`AppError::Validation`] for rejected input (nothing is written) and
    /// [`AppError::Store`] when the single write fails or times out.
    pub async fn create(&self, body: &Value) -> Result<CreatePasteResponse, AppError> {
        self.create_at(body, self.clock.now()).await
    }

    /// [`Self::create`] at an explicit instant.
    pub async fn create_at(
        &self,
        body: &Value,
        now: DateTime<Utc>,
    ) -> Result<CreatePasteResponse, AppError> {
        let request = lifecycle::validate(body)?;
        let paste = lifecycle::new_paste(request, lifecycle::generate_id(), now);
        let encoded = encode(&paste)?;
        let key = paste_key(&paste.id);

        match paste.ttl_seconds {
            Some(ttl) => {
                self.kv
                    .set_with_expiry(&key, &encoded, Duration::from_secs(ttl))
                    .await?
            }
            None => self.kv.set(&key, &encoded).await?,
        }

        debug!(
            "Created paste {} (ttl={:?}, max_views={:?})",
            paste.id, paste.ttl_seconds, paste.max_views
        );
        Ok(CreatePasteResponse {
            url: self.paste_url(&paste.id),
            id: paste.id,
        })
    }

    /// Serve a paste and count the view.
    ///
    /// # Errors
    /// [`AppError::NotFound`] when the paste is absent, expired, exhausted or
    /// unreadable. [`AppError::Store`] when the store fails, which callers
    /// should treat as retryable.
    pub async fn read(&self, id: &str) -> Result<PasteView, AppError> {
        self.read_at(id, self.clock.now()).await
    }

    /// [`Self::read`] at an explicit instant.
    pub async fn read_at(&self, id: &str, now: DateTime<Utc>) -> Result<PasteView, AppError> {
        let mut paste = self.load(id).await?.ok_or(AppError::NotFound)?;
        if !lifecycle::is_available(&paste, now) {
            return Err(AppError::NotFound);
        }

        let counted = self.count_view(&paste, now).await?;
        if let Some(max_views) = paste.max_views {
            // Lost the race for the last view(s).
            if counted.count > max_views {
                debug!("Paste {} over its view limit ({})", paste.id, counted.count);
                return Err(AppError::NotFound);
            }
        }

        paste.view_count = counted.count;
        if !counted.record_written {
            self.sync_record(&paste, now).await;
        }

        Ok(PasteView {
            remaining_views: lifecycle::remaining_views(paste.max_views, paste.view_count),
            expires_at: paste.expires_at,
            content: paste.content,
        })
    }

    /// Fetch and decode a record. Malformed records read as absent.
    async fn load(&self, id: &str) -> Result<Option<Paste>, AppError> {
        if !lifecycle::is_paste_id(id) {
            return Ok(None);
        }
        let Some(raw) = self.kv.get(&paste_key(id)).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<Paste>(&raw) {
            Ok(paste) => Ok(Some(paste)),
            Err(err) => {
                warn!("Ignoring unreadable paste record {}: {}", id, err);
                Ok(None)
            }
        }
    }

    /// Count one view on the atomic counter.
    ///
    /// The counter is seeded from the record's `viewCount` whenever it lags
    /// (first read, legacy record, or views counted by the fallback), so
    /// every concurrent reader still gets a distinct count.
    async fn count_view(&self, paste: &Paste, now: DateTime<Utc>) -> Result<CountedView, AppError> {
        let floor = i64::try_from(paste.view_count).unwrap_or(i64::MAX);
        let counter_ttl = lifecycle::remaining_ttl_seconds(paste, now)
            .map(|remaining| Duration::from_secs(remaining.max(1)));
        let counter = match self
            .kv
            .incr_from(&views_key(&paste.id), floor, counter_ttl)
            .await
        {
            Ok(value) => value,
            Err(err) => {
                return match self.fallback {
                    IncrementFallback::FailClosed => {
                        warn!("View increment for {} failed: {}", paste.id, err);
                        Err(err.into())
                    }
                    IncrementFallback::BestEffort => {
                        warn!(
                            "View increment for {} failed ({}); using non-atomic fallback",
                            paste.id, err
                        );
                        self.count_view_non_atomic(&paste.id, now).await
                    }
                };
            }
        };

        Ok(CountedView {
            count: u64::try_from(counter).unwrap_or(0),
            record_written: false,
        })
    }

    /// Fetch-modify-store on the record itself. Concurrent readers can
    /// overwrite each other, so limits are not enforced strictly here.
    async fn count_view_non_atomic(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<CountedView, AppError> {
        let mut fresh = self.load(id).await?.ok_or(AppError::NotFound)?;
        fresh.view_count = fresh.view_count.saturating_add(1);
        self.write_record(&fresh, now).await?;
        Ok(CountedView {
            count: fresh.view_count,
            record_written: true,
        })
    }

    /// Copy the counted views into the record.
    ///
    /// Concurrent syncs race, so a slower reader can briefly write back a
    /// lower `viewCount`. Limits stay enforced because the counter only
    /// ever moves up and is never seeded below its own value.
    async fn sync_record(&self, paste: &Paste, now: DateTime<Utc>) {
        if let Err(err) = self.write_record(paste, now).await {
            warn!("Failed to sync view count for paste {}: {}", paste.id, err);
        }
    }

    /// Rewrite a record, keeping whatever lifetime it has left.
    async fn write_record(&self, paste: &Paste, now: DateTime<Utc>) -> Result<(), AppError> {
        let encoded = encode(paste)?;
        let key = paste_key(&paste.id);
        match lifecycle::remaining_ttl_seconds(paste, now) {
            Some(0) => Ok(()),
            Some(remaining) => Ok(self
                .kv
                .set_with_expiry(&key, &encoded, Duration::from_secs(remaining))
                .await?),
            None => Ok(self.kv.set(&key, &encoded).await?),
        }
    }
}

struct CountedView {
    count: u64,
    /// The fallback already persisted the new count.
    record_written: bool,
}

fn encode(paste: &Paste) -> Result<String, AppError> {
    serde_json::to_string(paste)
        .map_err(|err| AppError::Internal(format!("failed to encode paste: {}", err)))
}
