//! Maintenance job selection, alerting, single-flight and the periodic loop.

mod support;

use std::sync::Arc;
use std::time::Duration;

use refcache_core::{Clock, ConfigError, ErrorKind};
use refcache_service::{
    maintenance_task, Dependencies, JobError, JobKind, MaintenanceSchedule, Refcache,
};
use refcache_sources::SourceFailure;
use refcache_test_utils::{fixtures, MockSourceClient};
use support::{test_config, CapturingScheduler, Harness, RecordingAlertSink};
use tokio::sync::watch;

#[tokio::test]
async fn test_expired_purge_removes_only_entries_past_max_age() {
    let h = Harness::new();
    let (ancient, old, edge, young) = (
        fixtures::key(1),
        fixtures::key(2),
        fixtures::key(3),
        fixtures::key(4),
    );
    h.seed(&ancient, "Ancient", 100).await;
    h.seed(&old, "Old", 91).await;
    h.seed(&edge, "Edge", 90).await;
    h.seed(&young, "Young", 5).await;

    let stats = h.service.jobs().run_expired_purge().await.unwrap();

    assert_eq!(stats.job, JobKind::ExpiredPurge);
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.failed, 0);
    assert!(h.entry(&ancient).await.is_none());
    assert!(h.entry(&old).await.is_none());
    assert!(h.entry(&edge).await.is_some());
    assert!(h.entry(&young).await.is_some());
    assert_eq!(h.total_source_calls(), 0);
}

#[tokio::test]
async fn test_expired_entry_is_gone_after_clock_advances_and_purge_runs() {
    let h = Harness::new();
    let key = fixtures::key(5);
    h.seed(&key, "Soon Gone", 0).await;

    h.clock.advance_days(100);
    h.service.jobs().run_expired_purge().await.unwrap();

    assert!(h.entry(&key).await.is_none());
    let result = h.service.resolve(key.as_str(), &h.scope, false).await;
    assert_eq!(result.source, refcache_core::ResolutionSource::Primary);
}

#[tokio::test]
async fn test_stale_refresh_targets_the_refresh_tier() {
    let h = Harness::new();
    let fresh = fixtures::key(10);
    let low = fixtures::key(11);
    let high = fixtures::key(12);
    let stale = fixtures::key(13);
    let expired = fixtures::key(14);
    h.seed(&fresh, "Fresh", 2).await;
    h.seed_accessed(&low, "Low", 5, 3).await;
    h.seed_accessed(&high, "High", 6, 7).await;
    h.seed(&stale, "Stale", 10).await;
    h.seed(&expired, "Expired", 100).await;

    let stats = h.service.jobs().run_stale_refresh().await.unwrap();

    assert_eq!(stats.processed, 2);
    assert_eq!(stats.succeeded, 2);
    assert_eq!(h.primary.calls_for(low.as_str()), 1);
    assert_eq!(h.primary.calls_for(high.as_str()), 1);
    assert_eq!(h.primary.calls_for(fresh.as_str()), 0);
    assert_eq!(h.primary.calls_for(stale.as_str()), 0);
    assert_eq!(h.entry(&high).await.unwrap().age_days(h.clock.now()), 0);
    assert!(h.alerts.alerts().is_empty());
}

#[tokio::test]
async fn test_stale_refresh_batch_prefers_most_accessed() {
    let mut config = test_config();
    config.maintenance.batch_size = 1;
    let h = Harness::with_config(config);
    let low = fixtures::key(20);
    let high = fixtures::key(21);
    h.seed_accessed(&low, "Low", 5, 1).await;
    h.seed_accessed(&high, "High", 6, 9).await;

    let stats = h.service.jobs().run_stale_refresh().await.unwrap();

    assert_eq!(stats.processed, 1);
    assert_eq!(h.primary.calls_for(high.as_str()), 1);
    assert_eq!(h.primary.calls_for(low.as_str()), 0);
}

#[tokio::test]
async fn test_stale_refresh_can_include_stale_entries() {
    let mut config = test_config();
    config.maintenance.include_stale = true;
    let h = Harness::with_config(config);
    h.seed(&fixtures::key(30), "Refresh", 6).await;
    h.seed(&fixtures::key(31), "Stale", 40).await;
    h.seed(&fixtures::key(32), "Boundary", 90).await;
    h.seed(&fixtures::key(33), "Expired", 91).await;

    let stats = h.service.jobs().run_stale_refresh().await.unwrap();

    assert_eq!(stats.processed, 3);
    assert_eq!(h.primary.calls_for(fixtures::key(33).as_str()), 0);
}

#[tokio::test]
async fn test_priority_refresh_uses_strict_access_threshold() {
    let h = Harness::new();
    let above = fixtures::key(40);
    let at = fixtures::key(41);
    let way_above_but_stale = fixtures::key(42);
    h.seed_accessed(&above, "Above", 1, 11).await;
    h.seed_accessed(&at, "At", 1, 10).await;
    h.seed_accessed(&way_above_but_stale, "Stale", 50, 12).await;

    let stats = h.service.jobs().run_priority_refresh().await.unwrap();

    assert_eq!(stats.job, JobKind::PriorityRefresh);
    assert_eq!(stats.processed, 2);
    assert_eq!(h.primary.calls_for(above.as_str()), 1);
    assert_eq!(h.primary.calls_for(way_above_but_stale.as_str()), 1);
    assert_eq!(h.primary.calls_for(at.as_str()), 0);
}

#[tokio::test]
async fn test_alert_is_raised_above_half_failures() {
    let h = Harness::new();
    h.fail_both();
    let keys: Vec<_> = (50..54).map(fixtures::key).collect();
    for key in &keys {
        h.seed(key, "Refresh Me", 6).await;
    }
    h.secondary
        .respond(keys[0].as_str(), Ok(support::value("Recovered")));

    let stats = h.service.jobs().run_stale_refresh().await.unwrap();

    assert_eq!(stats.processed, 4);
    assert_eq!(stats.failed, 3);
    assert!(stats.should_alert());
    let alerts = h.alerts.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].job, "stale_refresh");
    assert_eq!(alerts[0].failed, 3);
    assert_eq!(alerts[0].samples.len(), 3);
    assert_eq!(h.service.jobs().metrics().alerts_raised, 1);
}

#[tokio::test]
async fn test_no_alert_at_exactly_half_failures() {
    let h = Harness::new();
    let ok = fixtures::key(60);
    let bad = fixtures::key(61);
    h.seed(&ok, "Ok", 6).await;
    h.seed(&bad, "Bad", 6).await;
    h.primary
        .respond(bad.as_str(), Err(SourceFailure::new(ErrorKind::Network, "down")));
    h.secondary
        .respond(bad.as_str(), Err(SourceFailure::new(ErrorKind::Network, "down")));

    let stats = h.service.jobs().run_stale_refresh().await.unwrap();

    assert_eq!(stats.failed, 1);
    assert!(!stats.should_alert());
    assert!(h.alerts.alerts().is_empty());
    assert!(h.entry(&bad).await.unwrap().last_error.is_some());
}

#[tokio::test]
async fn test_overlapping_run_of_same_job_is_rejected() {
    let h = Harness::new();
    h.primary.set_latency(Some(Duration::from_millis(300)));
    h.seed(&fixtures::key(70), "Slow", 6).await;
    h.seed(&fixtures::key(71), "Expired", 120).await;
    let jobs = Arc::clone(h.service.jobs());

    let running = {
        let jobs = Arc::clone(&jobs);
        tokio::spawn(async move { jobs.run_stale_refresh().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let overlap = jobs.run_stale_refresh().await;
    assert!(matches!(
        overlap,
        Err(JobError::AlreadyRunning {
            job: JobKind::StaleRefresh
        })
    ));

    // A different job type is not blocked.
    let purge = jobs.run_expired_purge().await.unwrap();
    assert_eq!(purge.processed, 1);

    let first = running.await.unwrap().unwrap();
    assert_eq!(first.processed, 1);
    assert_eq!(jobs.metrics().skipped_runs, 1);

    // The guard is released once the run finishes.
    assert!(jobs.run_stale_refresh().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_maintenance_task_runs_jobs_until_shutdown() {
    let mut config = test_config();
    config.schedule = MaintenanceSchedule {
        stale_refresh_interval: Duration::from_secs(10),
        purge_interval: Duration::from_secs(10),
        priority_refresh_interval: Duration::from_secs(10),
    };
    let h = Harness::with_config(config);
    let refresh = fixtures::key(80);
    let expired = fixtures::key(81);
    h.seed(&refresh, "Refresh", 6).await;
    h.seed(&expired, "Expired", 100).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = h.service.spawn_maintenance(shutdown_rx);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.service.jobs().metrics().runs, 0, "first run waits one interval");

    tokio::time::sleep(Duration::from_secs(10)).await;
    shutdown_tx.send(true).unwrap();
    let snapshot = handle.await.unwrap();

    assert_eq!(snapshot.runs, 3);
    assert_eq!(snapshot.entries_purged, 1);
    assert_eq!(snapshot.entries_refreshed, 1);
    assert!(h.entry(&expired).await.is_none());
    assert_eq!(h.entry(&refresh).await.unwrap().age_days(h.clock.now()), 0);
}

#[test]
fn test_zero_schedule_interval_is_rejected_at_construction() {
    let mut config = test_config();
    config.schedule.purge_interval = Duration::ZERO;
    let clock = fixtures::manual_clock();

    let built = Refcache::new(
        &config,
        Dependencies {
            store: fixtures::memory_store(&clock),
            primary: Arc::new(MockSourceClient::new("primary")),
            secondary: Arc::new(MockSourceClient::new("secondary")),
            clock: Arc::new(clock),
            scheduler: Arc::new(CapturingScheduler::default()),
            alerts: Arc::new(RecordingAlertSink::default()),
        },
    );

    match built {
        Err(ConfigError::InvalidValue { field, .. }) => {
            assert_eq!(field, "schedule.purge_interval")
        }
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("a zero purge interval must not build a service"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_maintenance_task_survives_zero_interval() {
    let h = Harness::new();
    h.seed(&fixtures::key(90), "Expired", 100).await;
    let schedule = MaintenanceSchedule {
        stale_refresh_interval: Duration::from_secs(60),
        purge_interval: Duration::ZERO,
        priority_refresh_interval: Duration::from_secs(60),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(maintenance_task(
        Arc::clone(h.service.jobs()),
        schedule,
        shutdown_rx,
    ));
    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown_tx.send(true).unwrap();

    let snapshot = handle.await.expect("maintenance task must not panic");
    assert!(snapshot.entries_purged >= 1);
    assert!(h.entry(&fixtures::key(90)).await.is_none());
}
