//! LMDB-backed cache store with scope isolation.
//!
//! Uses heed (Rust bindings for LMDB) for a durable, memory-mapped store.
//! Entries are JSON-encoded under a [`ScopedKey`].
//!
//! # Transactions
//!
//! - `peek`, `find_for_refresh`, `list_scope` and `len` use read transactions
//! - `get` uses a write transaction because it bumps access statistics
//! - `upsert`, `record_failure` and `delete_expired` use write transactions

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RoTxn};
use refcache_core::{
    CacheEntry, Clock, EntryValue, Provenance, RefcacheError, RefcacheResult, ReferenceKey,
    ScopeId, StorageError,
};

use crate::scoped_key::ScopedKey;
use crate::traits::{CacheStore, RefreshQuery};

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for RefcacheError {
    fn from(e: LmdbStoreError) -> Self {
        match e {
            LmdbStoreError::Serialization(reason) | LmdbStoreError::Deserialization(reason) => {
                RefcacheError::Storage(StorageError::Serialization { reason })
            }
            other => RefcacheError::Storage(StorageError::Backend {
                reason: other.to_string(),
            }),
        }
    }
}

fn txn_err(e: heed::Error) -> LmdbStoreError {
    LmdbStoreError::Transaction(e.to_string())
}

fn encode_entry(entry: &CacheEntry) -> Result<Vec<u8>, LmdbStoreError> {
    serde_json::to_vec(entry).map_err(|e| LmdbStoreError::Serialization(e.to_string()))
}

fn decode_entry(bytes: &[u8]) -> Result<CacheEntry, LmdbStoreError> {
    serde_json::from_slice(bytes).map_err(|e| LmdbStoreError::Deserialization(e.to_string()))
}

/// Durable cache store on LMDB.
///
/// # Example
///
/// ```ignore
/// use refcache_storage::{CacheStore, LmdbCacheStore};
/// use refcache_core::SystemClock;
///
/// let store = LmdbCacheStore::open("/var/lib/refcache", 256, Arc::new(SystemClock))?;
/// let entry = store.upsert(&key, &scope, value, Provenance::Primary).await?;
/// ```
pub struct LmdbCacheStore {
    env: Env,
    db: Database<Bytes, Bytes>,
    clock: Arc<dyn Clock>,
}

impl LmdbCacheStore {
    /// Open (or create) a store in `path` with a map size of `max_size_mb`.
    pub fn open<P: AsRef<Path>>(
        path: P,
        max_size_mb: usize,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per path by this process and
        // the map is never accessed outside heed's transaction API.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        tracing::debug!(path = %path.as_ref().display(), max_size_mb, "LMDB cache store opened");

        Ok(Self { env, db, clock })
    }

    fn read_entry(
        &self,
        txn: &RoTxn<'_>,
        encoded: &[u8],
    ) -> Result<Option<CacheEntry>, LmdbStoreError> {
        match self.db.get(txn, encoded).map_err(txn_err)? {
            Some(bytes) => decode_entry(bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Decode every entry whose key starts with `prefix`. Undecodable rows are skipped.
    ///
    /// Scope-prefixed keys keep one scope's rows contiguous, so a scoped
    /// prefix reads only that scope.
    fn collect_with_prefix(&self, prefix: &[u8]) -> Result<Vec<CacheEntry>, LmdbStoreError> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let mut entries = Vec::new();
        for row in self.db.prefix_iter(&rtxn, prefix).map_err(txn_err)? {
            let (_, value) = match row {
                Ok(kv) => kv,
                Err(_) => continue,
            };
            match decode_entry(value) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(error = %e, "Skipping undecodable cache entry"),
            }
        }
        Ok(entries)
    }
}

impl std::fmt::Debug for LmdbCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbCacheStore")
            .field("path", &self.env.path())
            .finish()
    }
}

#[async_trait]
impl CacheStore for LmdbCacheStore {
    async fn get(&self, key: &ReferenceKey, scope: &ScopeId) -> RefcacheResult<Option<CacheEntry>> {
        let encoded = ScopedKey::new(scope, key).encode();
        let now = self.clock.now();

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let Some(mut entry) = self.read_entry(&wtxn, &encoded)? else {
            return Ok(None);
        };
        entry.record_access(now);
        let bytes = encode_entry(&entry)?;
        self.db.put(&mut wtxn, &encoded, &bytes).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;

        Ok(Some(entry))
    }

    async fn peek(
        &self,
        key: &ReferenceKey,
        scope: &ScopeId,
    ) -> RefcacheResult<Option<CacheEntry>> {
        let encoded = ScopedKey::new(scope, key).encode();
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        Ok(self.read_entry(&rtxn, &encoded)?)
    }

    async fn upsert(
        &self,
        key: &ReferenceKey,
        scope: &ScopeId,
        value: EntryValue,
        provenance: Provenance,
    ) -> RefcacheResult<CacheEntry> {
        let encoded = ScopedKey::new(scope, key).encode();
        let now = self.clock.now();

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let entry = match self.read_entry(&wtxn, &encoded)? {
            Some(mut existing) => {
                existing.apply_refresh(value, provenance, now);
                existing
            }
            None => CacheEntry::new(key.clone(), scope.clone(), value, provenance, now),
        };
        let bytes = encode_entry(&entry)?;
        self.db.put(&mut wtxn, &encoded, &bytes).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;

        Ok(entry)
    }

    async fn record_failure(
        &self,
        key: &ReferenceKey,
        scope: &ScopeId,
        message: &str,
    ) -> RefcacheResult<bool> {
        let encoded = ScopedKey::new(scope, key).encode();

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let Some(mut entry) = self.read_entry(&wtxn, &encoded)? else {
            return Ok(false);
        };
        entry.record_failure(message);
        let bytes = encode_entry(&entry)?;
        self.db.put(&mut wtxn, &encoded, &bytes).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;

        Ok(true)
    }

    async fn delete_expired(&self, max_age_days: i64) -> RefcacheResult<u64> {
        let now = self.clock.now();
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;

        let mut expired: Vec<Vec<u8>> = Vec::new();
        for row in self.db.iter(&wtxn).map_err(txn_err)? {
            let (key, value) = match row {
                Ok(kv) => kv,
                Err(_) => continue,
            };
            match decode_entry(value) {
                Ok(entry) if entry.age_days(now) > max_age_days => expired.push(key.to_vec()),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Skipping undecodable cache entry"),
            }
        }

        let mut deleted = 0u64;
        for key in &expired {
            if self.db.delete(&mut wtxn, key).map_err(txn_err)? {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(txn_err)?;

        Ok(deleted)
    }

    async fn find_for_refresh(&self, query: &RefreshQuery) -> RefcacheResult<Vec<CacheEntry>> {
        let prefix = query
            .scope
            .as_ref()
            .map(ScopedKey::scope_prefix)
            .unwrap_or_default();
        let candidates = self.collect_with_prefix(&prefix)?;
        Ok(query.select(candidates, self.clock.now()))
    }

    async fn list_scope(&self, scope: &ScopeId) -> RefcacheResult<Vec<CacheEntry>> {
        Ok(self.collect_with_prefix(&ScopedKey::scope_prefix(scope))?)
    }

    async fn len(&self) -> RefcacheResult<usize> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let count = self.db.len(&rtxn).map_err(txn_err)?;
        Ok(count as usize)
    }
}
