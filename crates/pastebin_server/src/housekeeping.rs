//! Periodic physical removal of store-expired entries.
//!
//! Expired pastes are already unreadable; the sweep only reclaims space in
//! backends without eager expiry.

use pastebin_core::KvClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Run one sweep, logging the outcome.
///
/// # Returns
/// Number of entries removed, 0 on failure.
pub async fn purge_once(kv: &KvClient) -> usize {
    match kv.purge_expired().await {
        Ok(0) => {
            debug!("Purge found no expired entries");
            0
        }
        Ok(removed) => {
            info!(removed, "purged expired entries");
            removed
        }
        Err(err) => {
            warn!("Purge of expired entries failed: {}", err);
            0
        }
    }
}

/// Spawn the sweep loop. A zero `every` disables it.
pub fn spawn_purge_task(kv: Arc<KvClient>, every: Duration) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        info!("Expired-entry purge disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            purge_once(&kv).await;
        }
    }))
}
