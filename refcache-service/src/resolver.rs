//! Waterfall resolution: cache, primary, secondary, stale cache, failure.
//!
//! [`WaterfallResolver::resolve`] never returns an error. Every outcome,
//! including an invalid key, is expressed as a [`ResolutionResult`].

use std::sync::Arc;
use std::time::Instant;

use refcache_core::{
    CacheEntry, Clock, EntryValue, ErrorKind, Provenance, RefcacheResult, ReferenceKey,
    ResolutionResult, ResolutionSource, ScopeId, TierClassifier,
};
use refcache_storage::CacheStore;

use crate::chain::SourceChain;
use crate::scheduler::{EnqueueOutcome, RefreshScheduler};

#[derive(Clone)]
pub struct WaterfallResolver {
    chain: SourceChain,
    classifier: TierClassifier,
    clock: Arc<dyn Clock>,
    refresher: RefreshScheduler,
}

impl WaterfallResolver {
    pub fn new(
        chain: SourceChain,
        classifier: TierClassifier,
        clock: Arc<dyn Clock>,
        refresher: RefreshScheduler,
    ) -> Self {
        Self {
            chain,
            classifier,
            clock,
            refresher,
        }
    }

    pub fn chain(&self) -> &SourceChain {
        &self.chain
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        self.chain.store()
    }

    pub fn classifier(&self) -> &TierClassifier {
        &self.classifier
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn refresher(&self) -> &RefreshScheduler {
        &self.refresher
    }

    /// Resolve `raw_key` within `scope`.
    ///
    /// With `force_refresh` the fresh-cache shortcut is skipped. Only a stale
    /// entry is served as a fallback when both sources fail.
    pub async fn resolve(
        &self,
        raw_key: &str,
        scope: &ScopeId,
        force_refresh: bool,
    ) -> ResolutionResult {
        let started = Instant::now();
        let result = match ReferenceKey::parse(raw_key) {
            Ok(key) => self.resolve_key(raw_key, &key, scope, force_refresh).await,
            Err(e) => {
                tracing::debug!(key = raw_key, error = %e, "Rejected invalid key");
                ResolutionResult::failed(
                    raw_key,
                    ErrorKind::Validation,
                    format!(
                        "'{}' is not a valid identifier ({}). Check the number or enter the details manually.",
                        raw_key, e
                    ),
                )
            }
        };
        result.with_elapsed(started.elapsed())
    }

    async fn resolve_key(
        &self,
        raw_key: &str,
        key: &ReferenceKey,
        scope: &ScopeId,
        force_refresh: bool,
    ) -> ResolutionResult {
        let now = self.clock.now();
        let cached = match self.store().peek(key, scope).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key = %key, scope = %scope, error = %e, "Cache read failed; treating as miss");
                None
            }
        };

        if let Some(entry) = &cached {
            let age = entry.age_days(now);
            if !force_refresh && self.classifier.is_fresh(age) {
                return self.serve_fresh(raw_key, key, scope, entry, age).await;
            }
        } else {
            tracing::debug!(key = %key, scope = %scope, "Cache miss");
        }

        match self.chain.fetch(key).await {
            Ok(fetched) => {
                let source = match fetched.provenance {
                    Provenance::Secondary => ResolutionSource::Secondary,
                    _ => ResolutionSource::Primary,
                };
                if let Err(e) = self
                    .store()
                    .upsert(key, scope, fetched.value.clone(), fetched.provenance)
                    .await
                {
                    tracing::warn!(
                        key = %key,
                        scope = %scope,
                        error = %e,
                        "Failed to persist resolved value"
                    );
                }
                ResolutionResult::upstream(raw_key, source, fetched.value)
            }
            Err(failure) => {
                if let Some(entry) = cached {
                    let age = entry.age_days(now);
                    if self.classifier.is_stale(age) {
                        tracing::warn!(
                            key = %key,
                            scope = %scope,
                            age_days = age,
                            "Serving stale cache after upstream failure"
                        );
                        return ResolutionResult::stale(raw_key, entry.value, age);
                    }
                }

                let kind = failure.error_kind();
                tracing::error!(
                    key = %key,
                    scope = %scope,
                    error_kind = %kind,
                    errors = %failure.summary(),
                    "Resolution failed; manual entry required"
                );
                ResolutionResult::failed(raw_key, kind, failure.user_message(key))
            }
        }
    }

    async fn serve_fresh(
        &self,
        raw_key: &str,
        key: &ReferenceKey,
        scope: &ScopeId,
        peeked: &CacheEntry,
        age: i64,
    ) -> ResolutionResult {
        let value = match self.store().get(key, scope).await {
            Ok(Some(entry)) => entry.value,
            Ok(None) => peeked.value.clone(),
            Err(e) => {
                tracing::warn!(key = %key, scope = %scope, error = %e, "Failed to record cache access");
                peeked.value.clone()
            }
        };
        tracing::debug!(key = %key, scope = %scope, age_days = age, "Cache hit");

        let enqueued = if self.classifier.needs_refresh(age) {
            match self.refresher.enqueue(key, scope) {
                Ok(EnqueueOutcome::Scheduled) | Ok(EnqueueOutcome::AlreadyQueued) => true,
                Err(e) => {
                    tracing::warn!(key = %key, scope = %scope, error = %e, "Failed to enqueue background refresh");
                    false
                }
            }
        } else {
            false
        };

        ResolutionResult::cached(raw_key, value, age).with_refresh_enqueued(enqueued)
    }

    /// Store a value entered by a person, replacing any cached value.
    pub async fn record_manual(
        &self,
        raw_key: &str,
        scope: &ScopeId,
        value: EntryValue,
    ) -> RefcacheResult<CacheEntry> {
        let key = ReferenceKey::parse(raw_key)?;
        let entry = self
            .store()
            .upsert(&key, scope, value, Provenance::Manual)
            .await?;
        tracing::info!(key = %key, scope = %scope, "Recorded manual entry");
        Ok(entry)
    }
}
