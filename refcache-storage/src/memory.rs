//! In-memory cache store.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use refcache_core::{
    CacheEntry, Clock, EntryValue, Provenance, RefcacheResult, ReferenceKey, ScopeId, StorageError,
};

use crate::traits::{CacheStore, RefreshQuery};

type EntryMap = HashMap<(ScopeId, ReferenceKey), CacheEntry>;

/// Cache store backed by a lock-guarded `HashMap`.
///
/// Suitable for single-process deployments and tests. Contents are lost on
/// restart; use [`crate::LmdbCacheStore`] for durability.
#[derive(Clone)]
pub struct InMemoryCacheStore {
    entries: Arc<RwLock<EntryMap>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCacheStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    fn slot(key: &ReferenceKey, scope: &ScopeId) -> (ScopeId, ReferenceKey) {
        (scope.clone(), key.clone())
    }
}

impl std::fmt::Debug for InMemoryCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.entries.read().map(|m| m.len()).unwrap_or_default();
        f.debug_struct("InMemoryCacheStore")
            .field("entries", &len)
            .finish()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &ReferenceKey, scope: &ScopeId) -> RefcacheResult<Option<CacheEntry>> {
        let now = self.clock.now();
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.get_mut(&Self::slot(key, scope)).map(|entry| {
            entry.record_access(now);
            entry.clone()
        }))
    }

    async fn peek(
        &self,
        key: &ReferenceKey,
        scope: &ScopeId,
    ) -> RefcacheResult<Option<CacheEntry>> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.get(&Self::slot(key, scope)).cloned())
    }

    async fn upsert(
        &self,
        key: &ReferenceKey,
        scope: &ScopeId,
        value: EntryValue,
        provenance: Provenance,
    ) -> RefcacheResult<CacheEntry> {
        let now = self.clock.now();
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let entry = match entries.entry(Self::slot(key, scope)) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().apply_refresh(value, provenance, now);
                occupied.get().clone()
            }
            Entry::Vacant(vacant) => vacant
                .insert(CacheEntry::new(
                    key.clone(),
                    scope.clone(),
                    value,
                    provenance,
                    now,
                ))
                .clone(),
        };
        Ok(entry)
    }

    async fn record_failure(
        &self,
        key: &ReferenceKey,
        scope: &ScopeId,
        message: &str,
    ) -> RefcacheResult<bool> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        match entries.get_mut(&Self::slot(key, scope)) {
            Some(entry) => {
                entry.record_failure(message);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_expired(&self, max_age_days: i64) -> RefcacheResult<u64> {
        let now = self.clock.now();
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let before = entries.len();
        entries.retain(|_, entry| entry.age_days(now) <= max_age_days);
        Ok((before - entries.len()) as u64)
    }

    async fn find_for_refresh(&self, query: &RefreshQuery) -> RefcacheResult<Vec<CacheEntry>> {
        let now = self.clock.now();
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(query.select(entries.values().cloned(), now))
    }

    async fn list_scope(&self, scope: &ScopeId) -> RefcacheResult<Vec<CacheEntry>> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries
            .values()
            .filter(|e| &e.scope == scope)
            .cloned()
            .collect())
    }

    async fn len(&self) -> RefcacheResult<usize> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.len())
    }
}
