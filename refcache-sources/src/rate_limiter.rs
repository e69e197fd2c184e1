//! Token-bucket gate for the authoritative upstream.
//!
//! One [`RateLimiter`] is built per process and shared by `Arc` with every
//! resolver, background refresh and maintenance job, so all primary calls
//! draw from the same bucket.

use governor::clock::DefaultClock;
use governor::{Quota, RateLimiter as GovernorLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub const DEFAULT_RATE_LIMIT_PER_SECOND: u32 = 10;
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 20;

/// Type alias for the rate limiter we use.
type DirectRateLimiter = GovernorLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    DefaultClock,
>;

/// Sustained rate and burst capacity of the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub per_second: u32,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: DEFAULT_RATE_LIMIT_PER_SECOND,
            burst: DEFAULT_RATE_LIMIT_BURST,
        }
    }
}

impl RateLimitConfig {
    /// Create RateLimitConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `REFCACHE_RATE_LIMIT_PER_SECOND`: Sustained calls per second (default: 10)
    /// - `REFCACHE_RATE_LIMIT_BURST`: Bucket capacity (default: 20)
    pub fn from_env() -> Self {
        let per_second = std::env::var("REFCACHE_RATE_LIMIT_PER_SECOND")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT_PER_SECOND);

        let burst = std::env::var("REFCACHE_RATE_LIMIT_BURST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT_BURST);

        Self { per_second, burst }
    }
}

/// Point-in-time view of the limiter for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterSnapshot {
    pub per_second: u32,
    pub burst: u32,
    pub acquired: u64,
    pub rejected: u64,
}

/// Shared token bucket.
pub struct RateLimiter {
    limiter: DirectRateLimiter,
    config: RateLimitConfig,
    acquired: AtomicU64,
    rejected: AtomicU64,
}

impl RateLimiter {
    /// Build a limiter. Zero values are raised to one.
    pub fn new(config: RateLimitConfig) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(config.per_second).unwrap_or(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::new(config.burst).unwrap_or(NonZeroU32::MIN));

        Self {
            limiter: GovernorLimiter::direct(quota),
            config,
            acquired: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Take one token if available. Never waits.
    pub fn try_acquire(&self) -> bool {
        match self.limiter.check() {
            Ok(()) => {
                self.acquired.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(not_until) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    wait_ms = not_until
                        .wait_time_from(governor::clock::Clock::now(&DefaultClock::default()))
                        .as_millis() as u64,
                    "Rate limiter rejected token request"
                );
                false
            }
        }
    }

    /// Wait for a token for at most `timeout`.
    ///
    /// Returns `false` if no token became available in time.
    pub async fn acquire(&self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.limiter.until_ready()).await {
            Ok(()) => {
                self.acquired.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Timed out waiting for rate limiter token"
                );
                false
            }
        }
    }

    pub fn snapshot(&self) -> RateLimiterSnapshot {
        RateLimiterSnapshot {
            per_second: self.config.per_second,
            burst: self.config.burst,
            acquired: self.acquired.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("acquired", &self.acquired.load(Ordering::Relaxed))
            .field("rejected", &self.rejected.load(Ordering::Relaxed))
            .finish()
    }
}
