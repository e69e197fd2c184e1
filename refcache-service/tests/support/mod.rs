//! Shared wiring for the service integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use refcache_core::{CacheEntry, EntryValue, ManualClock, ReferenceKey, ScheduleError, ScopeId};
use refcache_service::{
    AlertSink, Dependencies, MaintenanceAlert, Refcache, ScheduledTask, Scheduler, ServiceConfig,
};
use refcache_storage::{CacheStore, InMemoryCacheStore};
use refcache_test_utils::fixtures;
use refcache_test_utils::MockSourceClient;

/// Holds scheduled tasks until the test runs them.
#[derive(Default)]
pub struct CapturingScheduler {
    tasks: Mutex<Vec<(Duration, ScheduledTask)>>,
}

impl CapturingScheduler {
    pub fn pending(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }

    /// Run every captured task to completion, in scheduling order.
    pub async fn run_all(&self) -> usize {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap());
        let count = tasks.len();
        for (_, task) in tasks {
            task.await;
        }
        count
    }
}

impl Scheduler for CapturingScheduler {
    fn schedule_once(&self, delay: Duration, task: ScheduledTask) -> Result<(), ScheduleError> {
        self.tasks.lock().unwrap().push((delay, task));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<MaintenanceAlert>>,
}

impl RecordingAlertSink {
    pub fn alerts(&self) -> Vec<MaintenanceAlert> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn send(&self, alert: MaintenanceAlert) {
        self.alerts.lock().unwrap().push(alert);
    }
}

pub struct Harness {
    pub clock: ManualClock,
    pub store: Arc<InMemoryCacheStore>,
    pub primary: Arc<MockSourceClient>,
    pub secondary: Arc<MockSourceClient>,
    pub scheduler: Arc<CapturingScheduler>,
    pub alerts: Arc<RecordingAlertSink>,
    pub service: Refcache,
    pub scope: ScopeId,
}

/// Development defaults with no pacing anywhere.
pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::development();
    config.maintenance.call_delay = Duration::ZERO;
    config.maintenance.batch_size = 100;
    config.batch.delay = Duration::ZERO;
    config
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        Self::with_scheduler(config, Arc::new(CapturingScheduler::default()))
    }

    fn with_scheduler(config: ServiceConfig, scheduler: Arc<CapturingScheduler>) -> Self {
        let clock = fixtures::manual_clock();
        let store = fixtures::memory_store(&clock);
        let primary = Arc::new(MockSourceClient::succeeding("primary", "ACME PRIMARY S.A."));
        let secondary = Arc::new(MockSourceClient::succeeding("secondary", "ACME SECONDARY"));
        let alerts = Arc::new(RecordingAlertSink::default());

        let service = Refcache::new(
            &config,
            Dependencies {
                store: store.clone(),
                primary: primary.clone(),
                secondary: secondary.clone(),
                clock: Arc::new(clock.clone()),
                scheduler: scheduler.clone(),
                alerts: alerts.clone(),
            },
        )
        .expect("test config is valid");

        Self {
            clock,
            store,
            primary,
            secondary,
            scheduler,
            alerts,
            service,
            scope: fixtures::scope("tenant-a"),
        }
    }

    /// Seed an entry for `key` in the default scope, `age_days` old.
    pub async fn seed(&self, key: &ReferenceKey, name: &str, age_days: i64) -> CacheEntry {
        fixtures::seed_entry(
            self.store.as_ref(),
            &self.clock,
            key,
            &self.scope,
            fixtures::company_value(name),
            age_days,
        )
        .await
    }

    /// Seed and then record `accesses` cache reads.
    pub async fn seed_accessed(
        &self,
        key: &ReferenceKey,
        name: &str,
        age_days: i64,
        accesses: u64,
    ) -> CacheEntry {
        self.seed(key, name, age_days).await;
        for _ in 0..accesses {
            self.store.get(key, &self.scope).await.unwrap();
        }
        self.store.peek(key, &self.scope).await.unwrap().unwrap()
    }

    pub async fn entry(&self, key: &ReferenceKey) -> Option<CacheEntry> {
        self.store.peek(key, &self.scope).await.unwrap()
    }

    pub fn fail_both(&self) {
        use refcache_core::ErrorKind;
        use refcache_sources::SourceFailure;
        self.primary
            .set_default(Err(SourceFailure::new(ErrorKind::Network, "primary down")));
        self.secondary
            .set_default(Err(SourceFailure::new(ErrorKind::Network, "secondary down")));
    }

    pub fn total_source_calls(&self) -> usize {
        self.primary.call_count() + self.secondary.call_count()
    }
}

pub fn value(name: &str) -> EntryValue {
    fixtures::company_value(name)
}
