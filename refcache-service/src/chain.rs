//! Upstream half of the waterfall: primary (rate limited), then secondary.
//!
//! Shared by foreground resolution, background refresh and the maintenance
//! jobs so that every path obeys the same limiter and timeouts.

use std::sync::Arc;

use refcache_core::{
    CacheEntry, EntryValue, ErrorKind, Provenance, RefcacheError, ReferenceKey, ScopeId,
};
use refcache_sources::{RateLimiter, SourceClient, SourceFailure, SourceResult};
use refcache_storage::CacheStore;
use thiserror::Error;

/// A value obtained from an upstream source.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub value: EntryValue,
    pub provenance: Provenance,
}

/// Both sources failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainFailure {
    pub primary: SourceFailure,
    pub secondary: SourceFailure,
}

impl ChainFailure {
    /// Kind reported to callers: the primary's classification.
    pub fn error_kind(&self) -> ErrorKind {
        self.primary.kind
    }

    /// Message telling a person what to do next.
    pub fn user_message(&self, key: &ReferenceKey) -> String {
        match self.error_kind() {
            ErrorKind::NotFound => format!(
                "Identifier {} was not found in the primary registry or the fallback directory. \
                 Check the number or enter the details manually.",
                key
            ),
            ErrorKind::RateLimited => "The primary registry is receiving too many requests. \
                 Wait a moment and try again, or enter the details manually."
                .to_string(),
            ErrorKind::Timeout | ErrorKind::Network => "The registries could not be reached. \
                 Check network connectivity and try again, or enter the details manually."
                .to_string(),
            _ => format!(
                "Lookup failed ({}). Enter the details manually.",
                self.primary.message
            ),
        }
    }

    /// Compact description stored as `last_error` on the entry.
    pub fn summary(&self) -> String {
        format!("primary: {}; secondary: {}", self.primary, self.secondary)
    }
}

/// Why a refresh did not update the entry.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    #[error("all sources failed ({})", .0.summary())]
    Sources(ChainFailure),

    #[error("failed to persist refreshed value: {0}")]
    Persist(#[from] RefcacheError),
}

#[derive(Clone)]
pub struct SourceChain {
    store: Arc<dyn CacheStore>,
    primary: Arc<dyn SourceClient>,
    secondary: Arc<dyn SourceClient>,
    limiter: Arc<RateLimiter>,
}

impl SourceChain {
    pub fn new(
        store: Arc<dyn CacheStore>,
        primary: Arc<dyn SourceClient>,
        secondary: Arc<dyn SourceClient>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            store,
            primary,
            secondary,
            limiter,
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Try the primary (if a token is available), then the secondary.
    pub async fn fetch(&self, key: &ReferenceKey) -> Result<Fetched, ChainFailure> {
        let primary = if self.limiter.try_acquire() {
            match call_with_timeout(self.primary.as_ref(), key).await {
                Ok(value) => {
                    tracing::info!(key = %key, source = "primary", "Resolved from upstream");
                    return Ok(Fetched {
                        value,
                        provenance: Provenance::Primary,
                    });
                }
                Err(failure) => {
                    tracing::warn!(
                        key = %key,
                        source = "primary",
                        error_kind = %failure.kind,
                        error = %failure.message,
                        "Primary source failed"
                    );
                    failure
                }
            }
        } else {
            tracing::warn!(key = %key, "Primary source skipped by rate limiter");
            SourceFailure::rate_limited(self.primary.name())
        };

        match call_with_timeout(self.secondary.as_ref(), key).await {
            Ok(value) => {
                tracing::info!(key = %key, source = "secondary", "Resolved from upstream");
                Ok(Fetched {
                    value,
                    provenance: Provenance::Secondary,
                })
            }
            Err(secondary) => {
                tracing::warn!(
                    key = %key,
                    source = "secondary",
                    error_kind = %secondary.kind,
                    error = %secondary.message,
                    "Secondary source failed"
                );
                Err(ChainFailure { primary, secondary })
            }
        }
    }

    /// Fetch and persist. On failure the entry's `last_error` is updated and
    /// its value left as is.
    pub async fn refresh(
        &self,
        key: &ReferenceKey,
        scope: &ScopeId,
    ) -> Result<CacheEntry, RefreshError> {
        match self.fetch(key).await {
            Ok(fetched) => {
                let entry = self
                    .store
                    .upsert(key, scope, fetched.value, fetched.provenance)
                    .await?;
                Ok(entry)
            }
            Err(failure) => {
                if let Err(e) = self
                    .store
                    .record_failure(key, scope, &failure.summary())
                    .await
                {
                    tracing::warn!(key = %key, scope = %scope, error = %e, "Failed to record refresh failure");
                }
                Err(RefreshError::Sources(failure))
            }
        }
    }
}

/// Call a source, enforcing its declared timeout.
async fn call_with_timeout(client: &dyn SourceClient, key: &ReferenceKey) -> SourceResult {
    let timeout = client.timeout();
    match tokio::time::timeout(timeout, client.resolve(key)).await {
        Ok(result) => result,
        Err(_) => Err(SourceFailure::timed_out(client.name(), timeout)),
    }
}
