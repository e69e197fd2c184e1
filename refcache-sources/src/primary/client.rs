//! Authoritative registry HTTP client

use super::types::{normalize, RegistryResponse};
use crate::failure::SourceFailure;
use crate::rate_limiter::RateLimiter;
use crate::{SourceClient, SourceResult};
use async_trait::async_trait;
use refcache_core::{ConfigError, EntryValue, ErrorKind, ReferenceKey};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_PRIMARY_URL: &str = "https://api.hacienda.go.cr/fe/ae";
pub const DEFAULT_PRIMARY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_PRIMARY_MAX_ATTEMPTS: u32 = 1;
pub const DEFAULT_PRIMARY_BACKOFF_MS: u64 = 1_000;

const SOURCE_NAME: &str = "primary";

/// Configuration for the authoritative registry client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryConfig {
    pub base_url: String,
    /// Total budget for one `resolve` call, retries included.
    pub timeout: Duration,
    /// Attempts per `resolve`. Timeouts and network failures are retried;
    /// upstream 429s are not.
    pub max_attempts: u32,
    /// Delay before the first retry, doubled after each retry.
    pub initial_backoff: Duration,
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PRIMARY_URL.to_string(),
            timeout: Duration::from_millis(DEFAULT_PRIMARY_TIMEOUT_MS),
            max_attempts: DEFAULT_PRIMARY_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_PRIMARY_BACKOFF_MS),
        }
    }
}

impl PrimaryConfig {
    /// Create PrimaryConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `REFCACHE_PRIMARY_URL`: Registry endpoint
    /// - `REFCACHE_PRIMARY_TIMEOUT_MS`: Per-resolve budget (default: 5000)
    /// - `REFCACHE_PRIMARY_MAX_ATTEMPTS`: Attempts per resolve (default: 1)
    /// - `REFCACHE_PRIMARY_BACKOFF_MS`: First retry delay (default: 1000)
    pub fn from_env() -> Self {
        let base_url = std::env::var("REFCACHE_PRIMARY_URL")
            .unwrap_or_else(|_| DEFAULT_PRIMARY_URL.to_string());

        let timeout = Duration::from_millis(
            std::env::var("REFCACHE_PRIMARY_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PRIMARY_TIMEOUT_MS),
        );

        let max_attempts = std::env::var("REFCACHE_PRIMARY_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PRIMARY_MAX_ATTEMPTS);

        let initial_backoff = Duration::from_millis(
            std::env::var("REFCACHE_PRIMARY_BACKOFF_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PRIMARY_BACKOFF_MS),
        );

        Self {
            base_url,
            timeout,
            max_attempts,
            initial_backoff,
        }
    }
}

/// Client for the authoritative registry.
///
/// The caller pays one limiter token for the first attempt. With a limiter
/// attached, every retry draws its own token and retrying stops when the
/// bucket is empty.
pub struct PrimaryClient {
    client: Client,
    config: PrimaryConfig,
    limiter: Option<Arc<RateLimiter>>,
}

impl PrimaryClient {
    pub fn new(config: PrimaryConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient {
                source_name: SOURCE_NAME.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            config,
            limiter: None,
        })
    }

    /// Gate retries on the shared limiter.
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    fn retryable(failure: &SourceFailure) -> bool {
        failure.kind.is_transient() && failure.kind != ErrorKind::RateLimited
    }

    fn retry_permitted(&self) -> bool {
        self.limiter.as_ref().map_or(true, |l| l.try_acquire())
    }

    /// One HTTP round trip bounded by `budget`.
    async fn attempt(&self, key: &ReferenceKey, budget: Duration) -> SourceResult {
        let response = self
            .client
            .get(&self.config.base_url)
            .query(&[("identificacion", key.as_str())])
            .timeout(budget)
            .send()
            .await
            .map_err(|e| SourceFailure::from_transport(SOURCE_NAME, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceFailure::from_status(SOURCE_NAME, status, &body));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SourceFailure::from_transport(SOURCE_NAME, &e))?;
        let parsed: RegistryResponse = serde_json::from_value(raw.clone()).map_err(|e| {
            SourceFailure::new(
                ErrorKind::Unknown,
                format!("{} returned an unexpected payload: {}", SOURCE_NAME, e),
            )
        })?;

        normalize(parsed, raw)
    }
}

#[async_trait]
impl SourceClient for PrimaryClient {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }

    async fn resolve(&self, key: &ReferenceKey) -> Result<EntryValue, SourceFailure> {
        let deadline = Instant::now() + self.config.timeout;
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 1;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SourceFailure::timed_out(SOURCE_NAME, self.config.timeout));
            }

            match self.attempt(key, remaining).await {
                Ok(value) => return Ok(value),
                Err(failure) if Self::retryable(&failure) && attempt < max_attempts => {
                    if Instant::now() + backoff >= deadline {
                        return Err(failure);
                    }
                    if !self.retry_permitted() {
                        tracing::debug!(key = %key, attempt, "No rate limit token for retry");
                        return Err(failure);
                    }
                    tracing::debug!(
                        key = %key,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %failure,
                        "Retrying primary lookup"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(failure) => return Err(failure),
            }
        }
    }
}

impl std::fmt::Debug for PrimaryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimaryClient")
            .field("base_url", &self.config.base_url)
            .field("timeout", &self.config.timeout)
            .field("max_attempts", &self.config.max_attempts)
            .field("rate_limited_retries", &self.limiter.is_some())
            .finish()
    }
}
