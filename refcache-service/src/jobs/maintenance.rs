//! Maintenance job runs and the periodic driver task.
//!
//! Each job type has its own single-flight guard. A run that finds its guard
//! held returns [`JobError::AlreadyRunning`]; different job types never block
//! one another. Per-key failures are collected into [`JobStats`] and never
//! stop a run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use refcache_core::{CacheEntry, TierClassifier};
use refcache_storage::{RefreshOrder, RefreshQuery};
use tokio::sync::{watch, Mutex};
use tokio::time::{interval_at, MissedTickBehavior};

use super::{JobError, JobKind, JobStats};
use crate::alert::{AlertSink, MaintenanceAlert};
use crate::chain::SourceChain;
use crate::config::{MaintenanceConfig, MaintenanceSchedule};

// ============================================================================
// METRICS
// ============================================================================

/// Counters accumulated over the lifetime of a [`MaintenanceJobs`].
#[derive(Debug, Default)]
pub struct MaintenanceMetrics {
    /// Completed job runs of any type
    pub runs: AtomicU64,

    /// Runs rejected because the same job was already running
    pub skipped_runs: AtomicU64,

    /// Entries successfully refreshed by either refresh job
    pub entries_refreshed: AtomicU64,

    /// Entries whose refresh failed
    pub refresh_failures: AtomicU64,

    /// Entries deleted by the purge job
    pub entries_purged: AtomicU64,

    /// Alerts delivered to the sink
    pub alerts_raised: AtomicU64,
}

impl MaintenanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MaintenanceSnapshot {
        MaintenanceSnapshot {
            runs: self.runs.load(Ordering::Relaxed),
            skipped_runs: self.skipped_runs.load(Ordering::Relaxed),
            entries_refreshed: self.entries_refreshed.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            entries_purged: self.entries_purged.load(Ordering::Relaxed),
            alerts_raised: self.alerts_raised.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceSnapshot {
    pub runs: u64,
    pub skipped_runs: u64,
    pub entries_refreshed: u64,
    pub refresh_failures: u64,
    pub entries_purged: u64,
    pub alerts_raised: u64,
}

// ============================================================================
// JOBS
// ============================================================================

pub struct MaintenanceJobs {
    chain: SourceChain,
    classifier: TierClassifier,
    config: MaintenanceConfig,
    alerts: Arc<dyn AlertSink>,
    metrics: MaintenanceMetrics,
    stale_guard: Mutex<()>,
    purge_guard: Mutex<()>,
    priority_guard: Mutex<()>,
}

impl MaintenanceJobs {
    pub fn new(
        chain: SourceChain,
        classifier: TierClassifier,
        config: MaintenanceConfig,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            chain,
            classifier,
            config,
            alerts,
            metrics: MaintenanceMetrics::new(),
            stale_guard: Mutex::new(()),
            purge_guard: Mutex::new(()),
            priority_guard: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &MaintenanceConfig {
        &self.config
    }

    pub fn metrics(&self) -> MaintenanceSnapshot {
        self.metrics.snapshot()
    }

    /// Refresh entries in the refresh tier, most accessed first.
    pub async fn run_stale_refresh(&self) -> Result<JobStats, JobError> {
        let job = JobKind::StaleRefresh;
        let _guard = self.claim(&self.stale_guard, job)?;

        let upper = if self.config.include_stale {
            self.classifier.expire_after_days() + 1
        } else {
            self.classifier.stale_after_days()
        };
        let query = RefreshQuery::new(self.config.batch_size)
            .with_age_range(self.classifier.refresh_after_days(), upper)
            .with_order(RefreshOrder::AccessCountDesc);

        self.refresh_selected(job, &query).await
    }

    /// Refresh entries accessed more than the priority threshold, any tier.
    pub async fn run_priority_refresh(&self) -> Result<JobStats, JobError> {
        let job = JobKind::PriorityRefresh;
        let _guard = self.claim(&self.priority_guard, job)?;

        let query = RefreshQuery::new(self.config.batch_size)
            .with_min_access_count(self.config.priority_threshold.saturating_add(1))
            .with_order(RefreshOrder::AccessCountDesc);

        self.refresh_selected(job, &query).await
    }

    /// Delete entries older than `max_age_days`.
    pub async fn run_expired_purge(&self) -> Result<JobStats, JobError> {
        let job = JobKind::ExpiredPurge;
        let _guard = self.claim(&self.purge_guard, job)?;
        let started = Instant::now();

        let deleted = self
            .chain
            .store()
            .delete_expired(self.config.max_age_days)
            .await
            .map_err(|source| JobError::Store { job, source })?;

        self.metrics.entries_purged.fetch_add(deleted, Ordering::Relaxed);
        let stats = JobStats {
            processed: deleted,
            succeeded: deleted,
            duration: started.elapsed(),
            ..JobStats::empty(job)
        };
        self.finish(&stats).await;
        Ok(stats)
    }

    fn claim<'a>(
        &self,
        guard: &'a Mutex<()>,
        job: JobKind,
    ) -> Result<tokio::sync::MutexGuard<'a, ()>, JobError> {
        guard.try_lock().map_err(|_| {
            self.metrics.skipped_runs.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(job = %job, "Maintenance run skipped: previous run still active");
            JobError::AlreadyRunning { job }
        })
    }

    async fn refresh_selected(
        &self,
        job: JobKind,
        query: &RefreshQuery,
    ) -> Result<JobStats, JobError> {
        let started = Instant::now();
        let entries = self
            .chain
            .store()
            .find_for_refresh(query)
            .await
            .map_err(|source| JobError::Store { job, source })?;

        let mut stats = JobStats::empty(job);
        for (i, entry) in entries.iter().enumerate() {
            if i > 0 && !self.config.call_delay.is_zero() {
                tokio::time::sleep(self.config.call_delay).await;
            }
            self.refresh_one(entry, &mut stats).await;
        }

        stats.duration = started.elapsed();
        self.finish(&stats).await;
        Ok(stats)
    }

    async fn refresh_one(&self, entry: &CacheEntry, stats: &mut JobStats) {
        stats.processed += 1;
        match self.chain.refresh(&entry.key, &entry.scope).await {
            Ok(_) => {
                stats.succeeded += 1;
                self.metrics.entries_refreshed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(job = %stats.job, key = %entry.key, scope = %entry.scope, "Entry refreshed");
            }
            Err(e) => {
                stats.failed += 1;
                self.metrics.refresh_failures.fetch_add(1, Ordering::Relaxed);
                stats.errors.push((entry.key.to_string(), e.to_string()));
            }
        }
    }

    async fn finish(&self, stats: &JobStats) {
        self.metrics.runs.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            job = %stats.job,
            processed = stats.processed,
            succeeded = stats.succeeded,
            failed = stats.failed,
            duration_ms = stats.duration.as_millis() as u64,
            "Maintenance run completed"
        );

        if stats.should_alert() {
            self.metrics.alerts_raised.fetch_add(1, Ordering::Relaxed);
            self.alerts.send(MaintenanceAlert::from_stats(stats)).await;
        }
    }
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Run every job on its own interval until `shutdown_rx` turns true.
///
/// The first run of each job happens one interval after start. Runs are
/// spawned, so a slow job never delays the others; an overlapping run of the
/// same job is rejected by its guard and logged.
pub async fn maintenance_task(
    jobs: Arc<MaintenanceJobs>,
    schedule: MaintenanceSchedule,
    mut shutdown_rx: watch::Receiver<bool>,
) -> MaintenanceSnapshot {
    let start = tokio::time::Instant::now();
    // `interval_at` panics on a zero period; `ServiceConfig::validate` rejects it upstream.
    let period = |d: Duration| d.max(Duration::from_millis(1));

    let stale_period = period(schedule.stale_refresh_interval);
    let mut stale_interval = interval_at(start + stale_period, stale_period);
    stale_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let purge_period = period(schedule.purge_interval);
    let mut purge_interval = interval_at(start + purge_period, purge_period);
    purge_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let priority_period = period(schedule.priority_refresh_interval);
    let mut priority_interval = interval_at(start + priority_period, priority_period);
    priority_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        stale_refresh_secs = schedule.stale_refresh_interval.as_secs(),
        purge_secs = schedule.purge_interval.as_secs(),
        priority_refresh_secs = schedule.priority_refresh_interval.as_secs(),
        "Maintenance task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Maintenance task shutting down");
                    break;
                }
            }

            _ = stale_interval.tick() => {
                spawn_run(&jobs, JobKind::StaleRefresh);
            }

            _ = purge_interval.tick() => {
                spawn_run(&jobs, JobKind::ExpiredPurge);
            }

            _ = priority_interval.tick() => {
                spawn_run(&jobs, JobKind::PriorityRefresh);
            }
        }
    }

    let snapshot = jobs.metrics();
    tracing::info!(
        runs = snapshot.runs,
        skipped_runs = snapshot.skipped_runs,
        entries_refreshed = snapshot.entries_refreshed,
        entries_purged = snapshot.entries_purged,
        alerts_raised = snapshot.alerts_raised,
        "Maintenance task completed"
    );
    snapshot
}

fn spawn_run(jobs: &Arc<MaintenanceJobs>, job: JobKind) {
    let jobs = Arc::clone(jobs);
    tokio::spawn(async move {
        let result = match job {
            JobKind::StaleRefresh => jobs.run_stale_refresh().await,
            JobKind::ExpiredPurge => jobs.run_expired_purge().await,
            JobKind::PriorityRefresh => jobs.run_priority_refresh().await,
        };
        match result {
            Ok(_) | Err(JobError::AlreadyRunning { .. }) => {}
            Err(e) => tracing::error!(job = %job, error = %e, "Maintenance run failed"),
        }
    });
}
