//! Fixed-window request limiting on top of the store's atomic counter.

use crate::clock::SharedClock;
use crate::kv::{rate_limit_key, KvClient};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed {
        limit: u64,
        remaining: u64,
        /// Epoch seconds at which the current window ends.
        reset_at: i64,
    },
    Limited {
        limit: u64,
        /// Whole seconds until the window ends, at least 1.
        retry_after: u64,
        reset_at: i64,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Counts requests per client in windows of `window` seconds, keyed by
/// `(client, floor(now / window))`.
pub struct FixedWindowLimiter {
    kv: Arc<KvClient>,
    clock: SharedClock,
    max_requests: u64,
    window_secs: u64,
}

impl FixedWindowLimiter {
    /// A zero `window_secs` is treated as one second.
    pub fn new(kv: Arc<KvClient>, clock: SharedClock, max_requests: u64, window_secs: u64) -> Self {
        Self {
            kv,
            clock,
            max_requests,
            window_secs: window_secs.max(1),
        }
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    /// Count one request from `client` and decide whether to let it through.
    ///
    /// Store failures allow the request: the paste API staying up matters
    /// more than strict limiting.
    pub async fn check(&self, client: &str) -> RateDecision {
        let now_secs = self.clock.now().timestamp().max(0);
        let window_secs = i64::try_from(self.window_secs).unwrap_or(i64::MAX);
        let window = now_secs / window_secs;
        let reset_at = window.saturating_add(1).saturating_mul(window_secs);
        let allow_unmetered = RateDecision::Allowed {
            limit: self.max_requests,
            remaining: self.max_requests,
            reset_at,
        };

        let key = rate_limit_key(client, window);
        let count = match self.kv.incr(&key).await {
            Ok(count) => u64::try_from(count).unwrap_or(0),
            Err(err) => {
                warn!("Rate limiting unavailable for {}: {}", client, err);
                return allow_unmetered;
            }
        };

        if count == 1 {
            if let Err(err) = self
                .kv
                .expire(&key, Duration::from_secs(self.window_secs))
                .await
            {
                warn!("Failed to set rate limit window expiry for {}: {}", client, err);
            }
        }

        if count > self.max_requests {
            let retry_after = u64::try_from(reset_at - now_secs).unwrap_or(1).max(1);
            return RateDecision::Limited {
                limit: self.max_requests,
                retry_after,
                reset_at,
            };
        }

        RateDecision::Allowed {
            limit: self.max_requests,
            remaining: self.max_requests - count,
            reset_at,
        }
    }
}
