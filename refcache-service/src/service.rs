//! Wiring of the resolver, batch runner and maintenance jobs.
//!
//! One [`Refcache`] is built per process. Every component it hands out
//! shares the same store, clock, rate limiter and in-flight refresh set.

use std::sync::Arc;

use refcache_core::{Clock, ConfigError, ResolutionResult, ScopeId};
use refcache_sources::{PrimaryClient, RateLimiter, SecondaryClient, SourceClient};
use refcache_storage::CacheStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::alert::{AlertSink, TracingAlertSink};
use crate::batch::{BatchOutcome, BatchRunner};
use crate::chain::SourceChain;
use crate::config::{MaintenanceSchedule, ServiceConfig};
use crate::jobs::{maintenance_task, MaintenanceJobs, MaintenanceSnapshot};
use crate::resolver::WaterfallResolver;
use crate::scheduler::{RefreshScheduler, Scheduler, TokioScheduler};

/// External collaborators of a [`Refcache`].
pub struct Dependencies {
    pub store: Arc<dyn CacheStore>,
    pub primary: Arc<dyn SourceClient>,
    pub secondary: Arc<dyn SourceClient>,
    pub clock: Arc<dyn Clock>,
    pub scheduler: Arc<dyn Scheduler>,
    pub alerts: Arc<dyn AlertSink>,
}

#[derive(Clone)]
pub struct Refcache {
    resolver: WaterfallResolver,
    batch: BatchRunner,
    jobs: Arc<MaintenanceJobs>,
    schedule: MaintenanceSchedule,
}

impl Refcache {
    pub fn new(config: &ServiceConfig, deps: Dependencies) -> Result<Self, ConfigError> {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit));
        Self::with_limiter(config, deps, limiter)
    }

    fn with_limiter(
        config: &ServiceConfig,
        deps: Dependencies,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let classifier = config.tiers.classifier()?;

        let chain = SourceChain::new(deps.store, deps.primary, deps.secondary, limiter);
        let refresher = RefreshScheduler::new(chain.clone(), deps.scheduler, config.refresh.delay);
        let resolver = WaterfallResolver::new(chain.clone(), classifier, deps.clock, refresher);
        let batch = BatchRunner::new(resolver.clone(), config.batch);
        let jobs = Arc::new(MaintenanceJobs::new(
            chain,
            classifier,
            config.maintenance.clone(),
            deps.alerts,
        ));

        Ok(Self {
            resolver,
            batch,
            jobs,
            schedule: config.schedule,
        })
    }

    /// Build with the HTTP sources, the current tokio runtime and alerts
    /// logged through `tracing`. Primary retries draw from the same limiter
    /// as first attempts.
    pub fn with_http_sources(
        config: &ServiceConfig,
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let scheduler = TokioScheduler::current().map_err(|e| ConfigError::InvalidValue {
            field: "runtime".to_string(),
            value: "none".to_string(),
            reason: e.to_string(),
        })?;

        let limiter = Arc::new(RateLimiter::new(config.rate_limit));
        let primary =
            PrimaryClient::new(config.primary.clone())?.with_limiter(Arc::clone(&limiter));

        Self::with_limiter(
            config,
            Dependencies {
                store,
                primary: Arc::new(primary),
                secondary: Arc::new(SecondaryClient::new(config.secondary.clone())?),
                clock,
                scheduler: Arc::new(scheduler),
                alerts: Arc::new(TracingAlertSink),
            },
            limiter,
        )
    }

    pub fn resolver(&self) -> &WaterfallResolver {
        &self.resolver
    }

    pub fn jobs(&self) -> &Arc<MaintenanceJobs> {
        &self.jobs
    }

    pub async fn resolve(
        &self,
        raw_key: &str,
        scope: &ScopeId,
        force_refresh: bool,
    ) -> ResolutionResult {
        self.resolver.resolve(raw_key, scope, force_refresh).await
    }

    pub async fn batch_resolve<I, S>(&self, keys: I, scope: &ScopeId) -> BatchOutcome
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.batch.batch_resolve(keys, scope).await
    }

    /// Spawn the periodic maintenance loop on the current runtime.
    pub fn spawn_maintenance(
        &self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<MaintenanceSnapshot> {
        tokio::spawn(maintenance_task(
            Arc::clone(&self.jobs),
            self.schedule,
            shutdown_rx,
        ))
    }
}
