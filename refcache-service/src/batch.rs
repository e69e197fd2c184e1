//! Sequential resolution of many keys.

use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use refcache_core::{ResolutionResult, ResolutionSource, ScopeId};
use serde::Serialize;

use crate::config::BatchConfig;
use crate::resolver::WaterfallResolver;

/// Aggregate counts for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cache_hits: usize,
    /// Primary plus secondary resolutions.
    pub upstream_hits: usize,
    pub stale_hits: usize,
    pub elapsed: Duration,
}

impl BatchSummary {
    fn record(&mut self, result: &ResolutionResult) {
        self.total += 1;
        if result.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        match result.source {
            ResolutionSource::Cache => self.cache_hits += 1,
            ResolutionSource::Primary | ResolutionSource::Secondary => self.upstream_hits += 1,
            ResolutionSource::StaleCache => self.stale_hits += 1,
            ResolutionSource::Failed => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    /// One result per distinct input key, keyed by the key as given.
    pub results: BTreeMap<String, ResolutionResult>,
    pub summary: BatchSummary,
}

#[derive(Clone)]
pub struct BatchRunner {
    resolver: WaterfallResolver,
    config: BatchConfig,
}

impl BatchRunner {
    pub fn new(resolver: WaterfallResolver, config: BatchConfig) -> Self {
        Self { resolver, config }
    }

    /// Resolve each key in order, pausing between keys.
    ///
    /// A failing key never stops the batch. Repeated keys are resolved once.
    pub async fn batch_resolve<I, S>(&self, keys: I, scope: &ScopeId) -> BatchOutcome
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let started = Instant::now();
        let mut seen = HashSet::new();
        let mut results = BTreeMap::new();
        let mut summary = BatchSummary::default();

        for raw in keys {
            let raw = raw.as_ref();
            if !seen.insert(raw.to_string()) {
                continue;
            }
            if summary.total > 0 && !self.config.delay.is_zero() {
                tokio::time::sleep(self.config.delay).await;
            }

            let result = self.resolver.resolve(raw, scope, false).await;
            summary.record(&result);
            results.insert(raw.to_string(), result);
        }

        summary.elapsed = started.elapsed();
        tracing::info!(
            scope = %scope,
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            cache_hits = summary.cache_hits,
            upstream_hits = summary.upstream_hits,
            stale_hits = summary.stale_hits,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Batch resolution completed"
        );

        BatchOutcome { results, summary }
    }
}
