//! refcache Test Utilities
//!
//! Shared test infrastructure for the refcache workspace:
//! - A scriptable mock [`SourceClient`]
//! - Fixtures for keys, scopes, values and a seeded in-memory store
//! - Proptest generators

pub use refcache_core::{
    CacheEntry, Clock, EntityKind, EntityStatus, EntryValue, ErrorKind, ManualClock, Provenance,
    ReferenceKey, ScopeId,
};
pub use refcache_sources::{SourceClient, SourceFailure, SourceResult};
pub use refcache_storage::{CacheStore, InMemoryCacheStore};

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

// ============================================================================
// MOCK SOURCE
// ============================================================================

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scriptable upstream source.
///
/// Outcomes are chosen in this order: a per-key response, the next scripted
/// outcome, then the default outcome. The default is `not_found` until
/// changed. Every call is counted, including calls that later time out.
#[derive(Debug)]
pub struct MockSourceClient {
    name: &'static str,
    timeout: Duration,
    latency: Mutex<Option<Duration>>,
    per_key: Mutex<HashMap<String, SourceResult>>,
    script: Mutex<VecDeque<SourceResult>>,
    default: Mutex<SourceResult>,
    calls: AtomicUsize,
    calls_by_key: Mutex<HashMap<String, usize>>,
}

impl MockSourceClient {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            timeout: Duration::from_secs(1),
            latency: Mutex::new(None),
            per_key: Mutex::new(HashMap::new()),
            script: Mutex::new(VecDeque::new()),
            default: Mutex::new(Err(SourceFailure::new(
                ErrorKind::NotFound,
                format!("{} has no record", name),
            ))),
            calls: AtomicUsize::new(0),
            calls_by_key: Mutex::new(HashMap::new()),
        }
    }

    /// A source that resolves every key to `display_name`.
    pub fn succeeding(name: &'static str, display_name: &str) -> Self {
        let mock = Self::new(name);
        mock.set_default(Ok(EntryValue::new(display_name)));
        mock
    }

    /// A source that fails every call with `kind`.
    pub fn failing(name: &'static str, kind: ErrorKind) -> Self {
        let mock = Self::new(name);
        mock.set_default(Err(SourceFailure::new(kind, format!("{} failed", name))));
        mock
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(Some(latency));
        self
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *lock(&self.latency) = latency;
    }

    pub fn set_default(&self, outcome: SourceResult) {
        *lock(&self.default) = outcome;
    }

    /// Fixed outcome for one key.
    pub fn respond(&self, key: &str, outcome: SourceResult) {
        lock(&self.per_key).insert(key.to_string(), outcome);
    }

    /// Queue an outcome for the next call without a per-key response.
    pub fn push(&self, outcome: SourceResult) {
        lock(&self.script).push_back(outcome);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, key: &str) -> usize {
        lock(&self.calls_by_key).get(key).copied().unwrap_or(0)
    }

    fn next_outcome(&self, key: &str) -> SourceResult {
        if let Some(outcome) = lock(&self.per_key).get(key) {
            return outcome.clone();
        }
        if let Some(outcome) = lock(&self.script).pop_front() {
            return outcome;
        }
        lock(&self.default).clone()
    }
}

#[async_trait]
impl SourceClient for MockSourceClient {
    fn name(&self) -> &'static str {
        self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn resolve(&self, key: &ReferenceKey) -> SourceResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.calls_by_key)
            .entry(key.as_str().to_string())
            .or_insert(0) += 1;

        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.next_outcome(key.as_str())
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Arc;

    /// A fixed instant so that day arithmetic in tests is reproducible.
    pub fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    pub fn manual_clock() -> ManualClock {
        ManualClock::new(start_time())
    }

    /// The `n`th valid ten-digit key.
    pub fn key(n: u32) -> ReferenceKey {
        ReferenceKey::parse(&format!("31010{:05}", n % 100_000))
            .unwrap_or_else(|e| panic!("fixture key {} is invalid: {}", n, e))
    }

    pub fn scope(name: &str) -> ScopeId {
        ScopeId::new(name).unwrap_or_else(|e| panic!("fixture scope '{}' is invalid: {}", name, e))
    }

    pub fn company_value(name: &str) -> EntryValue {
        EntryValue::new(name)
            .with_kind(EntityKind::Company)
            .with_status(EntityStatus::Active)
            .with_classification("620100", "Software development")
            .with_regime("Régimen General")
    }

    pub fn person_value(name: &str) -> EntryValue {
        EntryValue::new(name)
            .with_kind(EntityKind::Person)
            .with_status(EntityStatus::Active)
    }

    /// An in-memory store sharing `clock`.
    pub fn memory_store(clock: &ManualClock) -> Arc<InMemoryCacheStore> {
        Arc::new(InMemoryCacheStore::new(Arc::new(clock.clone())))
    }

    /// Insert an entry whose `refreshed_at` lies `age_days` before the
    /// clock's current time. The clock is left where it was.
    pub async fn seed_entry(
        store: &dyn CacheStore,
        clock: &ManualClock,
        key: &ReferenceKey,
        scope: &ScopeId,
        value: EntryValue,
        age_days: i64,
    ) -> CacheEntry {
        let now = clock.now();
        clock.set(now - chrono::Duration::days(age_days));
        let entry = store.upsert(key, scope, value, Provenance::Primary).await;
        clock.set(now);
        entry.unwrap_or_else(|e| panic!("seeding {} failed: {}", key, e))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    /// Valid keys of 9 to 12 digits.
    pub fn arb_reference_key() -> impl Strategy<Value = ReferenceKey> {
        "[0-9]{9,12}".prop_filter_map("valid key", |s| ReferenceKey::parse(&s).ok())
    }

    pub fn arb_scope_id() -> impl Strategy<Value = ScopeId> {
        "[a-z][a-z0-9_-]{0,15}".prop_filter_map("valid scope", |s| ScopeId::new(s).ok())
    }

    pub fn arb_entity_kind() -> impl Strategy<Value = EntityKind> {
        prop_oneof![
            Just(EntityKind::Person),
            Just(EntityKind::Company),
            Just(EntityKind::Cooperative),
            Just(EntityKind::Trust),
            Just(EntityKind::Nonprofit),
            Just(EntityKind::Other),
        ]
    }

    pub fn arb_entry_value() -> impl Strategy<Value = EntryValue> {
        ("[A-Z][A-Za-z .]{2,40}", arb_entity_kind())
            .prop_map(|(name, kind)| EntryValue::new(name).with_kind(kind))
    }

    /// Ages spanning every tier with the default thresholds.
    pub fn arb_age_days() -> impl Strategy<Value = i64> {
        0i64..200
    }

    pub fn arb_error_kind() -> impl Strategy<Value = ErrorKind> {
        prop_oneof![
            Just(ErrorKind::NotFound),
            Just(ErrorKind::Timeout),
            Just(ErrorKind::RateLimited),
            Just(ErrorKind::Network),
            Just(ErrorKind::Validation),
            Just(ErrorKind::Unknown),
        ]
    }
}
