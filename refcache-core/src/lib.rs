//! refcache core types
//!
//! Data model and pure logic shared by every refcache crate: normalized keys
//! and scopes, the cache entry record, freshness tiers, the resolution
//! result, the error taxonomy and the clock abstraction. Nothing here does
//! I/O.

pub mod clock;
pub mod entry;
pub mod error;
pub mod health;
pub mod key;
pub mod resolution;
pub mod tier;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{
    truncate_chars, CacheEntry, Classification, EntityKind, EntityStatus, EntryValue, Provenance,
    MAX_ERROR_CHARS,
};
pub use error::{
    ConfigError, ErrorKind, RefcacheError, RefcacheResult, ScheduleError, StorageError,
    ValidationError,
};
pub use health::{HealthStatus, TierCounts};
pub use key::{ReferenceKey, ScopeId, MAX_KEY_DIGITS, MIN_KEY_DIGITS};
pub use resolution::{ResolutionResult, ResolutionSource};
pub use tier::{
    age_days, Tier, TierClassifier, DEFAULT_EXPIRE_AFTER_DAYS, DEFAULT_REFRESH_AFTER_DAYS,
    DEFAULT_STALE_AFTER_DAYS,
};
