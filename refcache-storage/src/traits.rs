//! Cache store trait and the refresh selection query.
//!
//! Stores hold exactly one [`CacheEntry`] per (key, scope). Writes are
//! last-writer-wins; access counters may lose increments under contention.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use refcache_core::{CacheEntry, EntryValue, Provenance, RefcacheResult, ReferenceKey, ScopeId};
use std::cmp::Ordering;

/// Persistent store of cache entries.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read an entry, counting the read as a cache access.
    ///
    /// On a hit `access_count` is incremented and `last_access_at` set. A
    /// miss has no side effects.
    async fn get(&self, key: &ReferenceKey, scope: &ScopeId) -> RefcacheResult<Option<CacheEntry>>;

    /// Read an entry without touching its access statistics.
    async fn peek(&self, key: &ReferenceKey, scope: &ScopeId)
        -> RefcacheResult<Option<CacheEntry>>;

    /// Create or update the entry for (key, scope).
    ///
    /// Creation sets `fetched_at = refreshed_at = now`. Update keeps
    /// `fetched_at`, resets `refreshed_at` and clears `last_error`.
    async fn upsert(
        &self,
        key: &ReferenceKey,
        scope: &ScopeId,
        value: EntryValue,
        provenance: Provenance,
    ) -> RefcacheResult<CacheEntry>;

    /// Record a failed refresh attempt. Returns `false` if there was no entry.
    async fn record_failure(
        &self,
        key: &ReferenceKey,
        scope: &ScopeId,
        message: &str,
    ) -> RefcacheResult<bool>;

    /// Delete every entry whose age in whole days exceeds `max_age_days`.
    async fn delete_expired(&self, max_age_days: i64) -> RefcacheResult<u64>;

    /// Select entries for background refresh.
    async fn find_for_refresh(&self, query: &RefreshQuery) -> RefcacheResult<Vec<CacheEntry>>;

    /// Every entry in a scope, in no particular order.
    async fn list_scope(&self, scope: &ScopeId) -> RefcacheResult<Vec<CacheEntry>>;

    /// Total number of entries across all scopes.
    async fn len(&self) -> RefcacheResult<usize>;
}

/// Ordering applied by [`CacheStore::find_for_refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshOrder {
    /// Most accessed first, ties broken by oldest `refreshed_at`.
    #[default]
    AccessCountDesc,
    /// Oldest `refreshed_at` first.
    RefreshedAtAsc,
}

/// Selection criteria for refresh candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshQuery {
    /// Inclusive lower bound on age in whole days.
    pub min_age_days: Option<i64>,
    /// Exclusive upper bound on age in whole days.
    pub max_age_days: Option<i64>,
    /// Inclusive lower bound on `access_count`.
    pub min_access_count: Option<u64>,
    pub scope: Option<ScopeId>,
    pub limit: usize,
    pub order: RefreshOrder,
}

impl RefreshQuery {
    pub fn new(limit: usize) -> Self {
        Self {
            min_age_days: None,
            max_age_days: None,
            min_access_count: None,
            scope: None,
            limit,
            order: RefreshOrder::default(),
        }
    }

    pub fn with_age_range(mut self, min_days: i64, max_days_exclusive: i64) -> Self {
        self.min_age_days = Some(min_days);
        self.max_age_days = Some(max_days_exclusive);
        self
    }

    pub fn with_min_access_count(mut self, count: u64) -> Self {
        self.min_access_count = Some(count);
        self
    }

    pub fn with_scope(mut self, scope: ScopeId) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_order(mut self, order: RefreshOrder) -> Self {
        self.order = order;
        self
    }

    pub fn matches(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        let age = entry.age_days(now);
        if self.min_age_days.is_some_and(|min| age < min) {
            return false;
        }
        if self.max_age_days.is_some_and(|max| age >= max) {
            return false;
        }
        if self
            .min_access_count
            .is_some_and(|min| entry.access_count < min)
        {
            return false;
        }
        if let Some(scope) = &self.scope {
            if &entry.scope != scope {
                return false;
            }
        }
        true
    }

    /// Filter, order and truncate a set of candidate entries.
    pub fn select<I>(&self, entries: I, now: DateTime<Utc>) -> Vec<CacheEntry>
    where
        I: IntoIterator<Item = CacheEntry>,
    {
        let mut selected: Vec<CacheEntry> = entries
            .into_iter()
            .filter(|e| self.matches(e, now))
            .collect();
        selected.sort_by(|a, b| self.compare(a, b));
        selected.truncate(self.limit);
        selected
    }

    fn compare(&self, a: &CacheEntry, b: &CacheEntry) -> Ordering {
        match self.order {
            RefreshOrder::AccessCountDesc => b
                .access_count
                .cmp(&a.access_count)
                .then_with(|| a.refreshed_at.cmp(&b.refreshed_at)),
            RefreshOrder::RefreshedAtAsc => a.refreshed_at.cmp(&b.refreshed_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(key: &str, age_days: i64, access_count: u64, now: DateTime<Utc>) -> CacheEntry {
        let mut e = CacheEntry::new(
            ReferenceKey::parse(key).unwrap(),
            ScopeId::new("tenant1").unwrap(),
            EntryValue::new(key),
            Provenance::Primary,
            now - Duration::days(age_days),
        );
        e.access_count = access_count;
        e
    }

    #[test]
    fn test_age_range_is_min_inclusive_max_exclusive() {
        let now = Utc::now();
        let q = RefreshQuery::new(10).with_age_range(5, 7);
        assert!(!q.matches(&entry("100000004", 4, 0, now), now));
        assert!(q.matches(&entry("100000005", 5, 0, now), now));
        assert!(q.matches(&entry("100000006", 6, 0, now), now));
        assert!(!q.matches(&entry("100000007", 7, 0, now), now));
    }

    #[test]
    fn test_access_desc_breaks_ties_by_oldest_refresh() {
        let now = Utc::now();
        let entries = vec![
            entry("100000001", 5, 3, now),
            entry("100000002", 6, 3, now),
            entry("100000003", 5, 9, now),
        ];
        let selected = RefreshQuery::new(10).select(entries, now);
        let keys: Vec<&str> = selected.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["100000003", "100000002", "100000001"]);
    }

    #[test]
    fn test_select_truncates_to_limit() {
        let now = Utc::now();
        let entries = (0..5).map(|i| entry(&format!("10000000{}", i), 1, i, now));
        let selected = RefreshQuery::new(2).select(entries, now);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].access_count, 4);
    }

    #[test]
    fn test_min_access_count_and_scope_filter() {
        let now = Utc::now();
        let q = RefreshQuery::new(10)
            .with_min_access_count(11)
            .with_scope(ScopeId::new("tenant1").unwrap());
        assert!(!q.matches(&entry("100000001", 0, 10, now), now));
        assert!(q.matches(&entry("100000001", 0, 11, now), now));

        let mut other = entry("100000001", 0, 50, now);
        other.scope = ScopeId::new("tenant2").unwrap();
        assert!(!q.matches(&other, now));
    }
}
