//! refcache storage layer
//!
//! The [`CacheStore`] trait and its two implementations:
//!
//! - [`InMemoryCacheStore`]: lock-guarded map, for tests and single-process use
//! - [`LmdbCacheStore`]: durable LMDB store with scope-prefixed keys

mod lmdb;
mod memory;
mod scoped_key;
mod traits;

pub use lmdb::{LmdbCacheStore, LmdbStoreError};
pub use memory::InMemoryCacheStore;
pub use scoped_key::ScopedKey;
pub use traits::{CacheStore, RefreshOrder, RefreshQuery};
