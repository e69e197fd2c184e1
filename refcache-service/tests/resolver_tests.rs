//! Waterfall resolution and background refresh through the public service.

mod support;

use std::sync::Arc;
use std::time::Duration;

use refcache_core::{Clock, ErrorKind, Provenance, ResolutionSource};
use refcache_service::{Dependencies, Refcache, TokioScheduler};
use refcache_sources::{RateLimitConfig, SourceFailure};
use refcache_test_utils::{fixtures, MockSourceClient};
use support::{test_config, value, Harness, RecordingAlertSink};

#[tokio::test]
async fn test_fresh_entry_is_served_without_source_calls() {
    let h = Harness::new();
    let key = fixtures::key(1);
    h.seed(&key, "Fresh Co", 2).await;

    let result = h.service.resolve(key.as_str(), &h.scope, false).await;

    assert!(result.success);
    assert_eq!(result.source, ResolutionSource::Cache);
    assert!(!result.degraded);
    assert!(!result.refresh_enqueued);
    assert_eq!(result.age_days, Some(2));
    assert_eq!(result.value.unwrap().display_name, "Fresh Co");
    assert_eq!(h.total_source_calls(), 0);
    assert_eq!(h.scheduler.pending(), 0);
}

#[tokio::test]
async fn test_each_cache_hit_counts_one_access() {
    let h = Harness::new();
    let key = fixtures::key(2);
    h.seed(&key, "Counted Co", 0).await;

    for _ in 0..3 {
        h.service.resolve(key.as_str(), &h.scope, false).await;
    }

    let entry = h.entry(&key).await.unwrap();
    assert_eq!(entry.access_count, 3);
    assert!(entry.last_access_at.is_some());
}

#[tokio::test]
async fn test_entry_in_refresh_window_is_served_and_refreshed_in_background() {
    let h = Harness::new();
    let key = fixtures::key(3);
    let seeded = h.seed(&key, "Old Name", 6).await;

    let result = h.service.resolve(key.as_str(), &h.scope, false).await;

    assert!(result.success);
    assert_eq!(result.source, ResolutionSource::Cache);
    assert!(result.refresh_enqueued);
    assert_eq!(result.value.unwrap().display_name, "Old Name");
    assert_eq!(h.primary.call_count(), 0, "caller must not wait on the refresh");
    assert_eq!(h.scheduler.pending(), 1);

    assert_eq!(h.scheduler.run_all().await, 1);

    assert_eq!(h.primary.call_count(), 1);
    let refreshed = h.entry(&key).await.unwrap();
    assert_eq!(refreshed.value.display_name, "ACME PRIMARY S.A.");
    assert_eq!(refreshed.refreshed_at, h.clock.now());
    assert_eq!(refreshed.fetched_at, seeded.fetched_at);
    assert_eq!(h.service.resolver().refresher().in_flight(), 0);
}

#[tokio::test]
async fn test_duplicate_enqueue_while_pending_is_coalesced() {
    let h = Harness::new();
    let key = fixtures::key(4);
    h.seed(&key, "Busy Co", 5).await;

    let first = h.service.resolve(key.as_str(), &h.scope, false).await;
    let second = h.service.resolve(key.as_str(), &h.scope, false).await;

    assert!(first.refresh_enqueued);
    assert!(second.refresh_enqueued);
    assert_eq!(h.scheduler.pending(), 1);

    h.scheduler.run_all().await;
    assert_eq!(h.primary.call_count(), 1);

    let after = h.service.resolve(key.as_str(), &h.scope, false).await;
    assert!(!after.refresh_enqueued);
    assert_eq!(after.age_days, Some(0));
}

#[tokio::test]
async fn test_failed_background_refresh_keeps_cached_value() {
    let h = Harness::new();
    let key = fixtures::key(5);
    let seeded = h.seed(&key, "Kept Co", 6).await;
    h.fail_both();

    h.service.resolve(key.as_str(), &h.scope, false).await;
    h.scheduler.run_all().await;

    let entry = h.entry(&key).await.unwrap();
    assert_eq!(entry.value.display_name, "Kept Co");
    assert_eq!(entry.refreshed_at, seeded.refreshed_at);
    let error = entry.last_error.expect("failure is recorded");
    assert!(error.contains("primary"));
    assert!(error.contains("secondary"));
}

#[tokio::test]
async fn test_stale_entry_is_served_degraded_when_both_sources_fail() {
    let h = Harness::new();
    let key = fixtures::key(6);
    let seeded = h.seed(&key, "Stale Co", 10).await;
    h.fail_both();

    let result = h.service.resolve(key.as_str(), &h.scope, false).await;

    assert!(result.success);
    assert_eq!(result.source, ResolutionSource::StaleCache);
    assert!(result.degraded);
    assert_eq!(result.age_days, Some(10));
    assert!(result.warning.unwrap().contains("10"));
    assert_eq!(h.primary.call_count(), 1);
    assert_eq!(h.secondary.call_count(), 1);

    let entry = h.entry(&key).await.unwrap();
    assert_eq!(entry, seeded, "stale fallback performs no write");
}

#[tokio::test]
async fn test_stale_entry_is_replaced_when_a_source_answers() {
    let h = Harness::new();
    let key = fixtures::key(7);
    h.seed(&key, "Stale Co", 30).await;

    let result = h.service.resolve(key.as_str(), &h.scope, false).await;

    assert_eq!(result.source, ResolutionSource::Primary);
    assert_eq!(result.age_days, Some(0));
    assert_eq!(h.entry(&key).await.unwrap().value.display_name, "ACME PRIMARY S.A.");
}

#[tokio::test]
async fn test_secondary_is_tried_when_primary_fails() {
    let h = Harness::new();
    let key = fixtures::key(8);
    h.primary
        .set_default(Err(SourceFailure::new(ErrorKind::Timeout, "slow")));

    let result = h.service.resolve(key.as_str(), &h.scope, false).await;

    assert!(result.success);
    assert_eq!(result.source, ResolutionSource::Secondary);
    assert_eq!(h.primary.call_count(), 1);
    assert_eq!(h.secondary.call_count(), 1);
    let entry = h.entry(&key).await.unwrap();
    assert_eq!(entry.provenance, Provenance::Secondary);
    assert_eq!(entry.value.display_name, "ACME SECONDARY");
}

#[tokio::test]
async fn test_primary_timeout_is_enforced_by_the_caller() {
    let h = Harness::new();
    let slow = Arc::new(
        MockSourceClient::succeeding("primary", "Too Late")
            .with_timeout(Duration::from_millis(50))
            .with_latency(Duration::from_secs(5)),
    );
    let service = Refcache::new(
        &test_config(),
        Dependencies {
            store: h.store.clone(),
            primary: slow.clone(),
            secondary: h.secondary.clone(),
            clock: Arc::new(h.clock.clone()),
            scheduler: h.scheduler.clone(),
            alerts: Arc::new(RecordingAlertSink::default()),
        },
    )
    .unwrap();

    let result = service.resolve(fixtures::key(9).as_str(), &h.scope, false).await;

    assert_eq!(result.source, ResolutionSource::Secondary);
    assert_eq!(slow.call_count(), 1);
    assert!(result.elapsed < Duration::from_secs(5));
}

#[tokio::test]
async fn test_rate_limited_primary_falls_through_to_secondary() {
    let mut config = test_config();
    config.rate_limit = RateLimitConfig {
        per_second: 1,
        burst: 1,
    };
    let h = Harness::with_config(config);

    let first = h.service.resolve(fixtures::key(10).as_str(), &h.scope, false).await;
    let second = h.service.resolve(fixtures::key(11).as_str(), &h.scope, false).await;

    assert_eq!(first.source, ResolutionSource::Primary);
    assert_eq!(second.source, ResolutionSource::Secondary);
    assert_eq!(h.primary.call_count(), 1);
    assert_eq!(h.service.resolver().chain().limiter().snapshot().rejected, 1);
}

#[tokio::test]
async fn test_rate_limited_failure_reports_rate_limited() {
    let mut config = test_config();
    config.rate_limit = RateLimitConfig {
        per_second: 1,
        burst: 1,
    };
    let h = Harness::with_config(config);
    h.resolve_and_drain().await;
    h.secondary
        .set_default(Err(SourceFailure::new(ErrorKind::NotFound, "no record")));

    let result = h.service.resolve(fixtures::key(12).as_str(), &h.scope, false).await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::RateLimited));
    assert!(result.message.unwrap().contains("too many requests"));
}

#[tokio::test]
async fn test_miss_with_both_sources_failing_requires_manual_entry() {
    let h = Harness::new();
    let key = fixtures::key(13);
    h.primary
        .set_default(Err(SourceFailure::new(ErrorKind::NotFound, "no record")));
    h.secondary
        .set_default(Err(SourceFailure::new(ErrorKind::NotFound, "no record")));

    let result = h.service.resolve(key.as_str(), &h.scope, false).await;

    assert!(!result.success);
    assert_eq!(result.source, ResolutionSource::Failed);
    assert!(result.manual_entry_required);
    assert_eq!(result.error_kind, Some(ErrorKind::NotFound));
    assert!(result.message.unwrap().contains(key.as_str()));
    assert!(h.entry(&key).await.is_none());
}

#[tokio::test]
async fn test_expired_entry_is_not_a_fallback() {
    let h = Harness::new();
    let key = fixtures::key(14);
    h.seed(&key, "Ancient Co", 100).await;
    h.fail_both();

    let result = h.service.resolve(key.as_str(), &h.scope, false).await;

    assert!(!result.success);
    assert!(result.manual_entry_required);
    assert_eq!(result.error_kind, Some(ErrorKind::Network));
}

#[tokio::test]
async fn test_invalid_key_is_a_validation_failure() {
    let h = Harness::new();

    let result = h.service.resolve("31-AB-99", &h.scope, false).await;

    assert!(!result.success);
    assert_eq!(result.key, "31-AB-99");
    assert_eq!(result.error_kind, Some(ErrorKind::Validation));
    assert!(result.manual_entry_required);
    assert_eq!(h.total_source_calls(), 0);
}

#[tokio::test]
async fn test_force_refresh_bypasses_fresh_cache() {
    let h = Harness::new();
    let key = fixtures::key(15);
    h.seed(&key, "Fresh Co", 1).await;

    let result = h.service.resolve(key.as_str(), &h.scope, true).await;

    assert_eq!(result.source, ResolutionSource::Primary);
    assert_eq!(h.primary.call_count(), 1);
}

#[tokio::test]
async fn test_force_refresh_of_fresh_entry_fails_when_sources_fail() {
    let h = Harness::new();
    let key = fixtures::key(16);
    h.seed(&key, "Fresh Co", 1).await;
    h.fail_both();

    let result = h.service.resolve(key.as_str(), &h.scope, true).await;

    assert!(!result.success);
    assert_eq!(result.source, ResolutionSource::Failed);
    assert!(result.manual_entry_required);
    assert!(!result.degraded);
    assert!(result.value.is_none());
    // The cached value is untouched.
    assert_eq!(h.entry(&key).await.unwrap().value.display_name, "Fresh Co");
}

#[tokio::test]
async fn test_force_refresh_of_stale_entry_serves_stale_when_sources_fail() {
    let h = Harness::new();
    let key = fixtures::key(18);
    h.seed(&key, "Stale Co", 12).await;
    h.fail_both();

    let result = h.service.resolve(key.as_str(), &h.scope, true).await;

    assert!(result.success);
    assert_eq!(result.source, ResolutionSource::StaleCache);
    assert!(result.degraded);
    assert_eq!(result.value.unwrap().display_name, "Stale Co");
}

#[tokio::test]
async fn test_scopes_are_isolated() {
    let h = Harness::new();
    let key = fixtures::key(17);
    h.seed(&key, "Tenant A Co", 0).await;
    let other = fixtures::scope("tenant-b");

    let result = h.service.resolve(key.as_str(), &other, false).await;

    assert_eq!(result.source, ResolutionSource::Primary);
    assert_eq!(h.primary.call_count(), 1);
    assert_eq!(h.entry(&key).await.unwrap().value.display_name, "Tenant A Co");
}

#[tokio::test]
async fn test_manual_entry_is_stored_and_served() {
    let h = Harness::new();

    let entry = h
        .service
        .resolver()
        .record_manual("3101-000-018", &h.scope, value("Typed By Hand"))
        .await
        .unwrap();
    assert_eq!(entry.provenance, Provenance::Manual);

    let result = h.service.resolve("3101000018", &h.scope, false).await;
    assert_eq!(result.source, ResolutionSource::Cache);
    assert_eq!(result.value.unwrap().display_name, "Typed By Hand");
    assert_eq!(h.total_source_calls(), 0);
}

#[tokio::test]
async fn test_manual_entry_rejects_invalid_key() {
    let h = Harness::new();
    let err = h
        .service
        .resolver()
        .record_manual("abc", &h.scope, value("Nope"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("abc"));
}

#[tokio::test]
async fn test_tokio_scheduler_refreshes_eventually() {
    let clock = fixtures::manual_clock();
    let store = fixtures::memory_store(&clock);
    let primary = Arc::new(MockSourceClient::succeeding("primary", "Refreshed Co"));
    let secondary = Arc::new(MockSourceClient::new("secondary"));
    let service = Refcache::new(
        &test_config(),
        Dependencies {
            store: store.clone(),
            primary: primary.clone(),
            secondary,
            clock: Arc::new(clock.clone()),
            scheduler: Arc::new(TokioScheduler::current().unwrap()),
            alerts: Arc::new(RecordingAlertSink::default()),
        },
    )
    .unwrap();
    let scope = fixtures::scope("tenant-a");
    let key = fixtures::key(19);
    fixtures::seed_entry(store.as_ref(), &clock, &key, &scope, value("Old Co"), 6).await;

    let result = service.resolve(key.as_str(), &scope, false).await;
    assert!(result.refresh_enqueued);

    for _ in 0..200 {
        if primary.call_count() == 1 && service.resolver().refresher().in_flight() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(primary.call_count(), 1);
    let entry = refcache_storage::CacheStore::peek(store.as_ref(), &key, &scope)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.value.display_name, "Refreshed Co");
}

impl Harness {
    /// Spend the single rate-limit token on an unrelated lookup.
    async fn resolve_and_drain(&self) {
        self.service
            .resolve(fixtures::key(999).as_str(), &self.scope, false)
            .await;
    }
}
