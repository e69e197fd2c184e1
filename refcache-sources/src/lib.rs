//! refcache upstream sources
//!
//! The [`SourceClient`] abstraction, the two HTTP implementations and the
//! process-wide [`RateLimiter`] that gates the primary source.
//!
//! Clients never panic or return untyped errors: every failure is a
//! [`SourceFailure`] carrying an [`refcache_core::ErrorKind`].

use async_trait::async_trait;
use refcache_core::{EntityKind, EntryValue, ReferenceKey};
use std::time::Duration;

mod failure;
pub mod primary;
mod rate_limiter;
pub mod secondary;

pub use failure::{extract_error_message, kind_for_status, kind_for_transport, SourceFailure};
pub use primary::{PrimaryClient, PrimaryConfig};
pub use rate_limiter::{
    RateLimitConfig, RateLimiter, RateLimiterSnapshot, DEFAULT_RATE_LIMIT_BURST,
    DEFAULT_RATE_LIMIT_PER_SECOND,
};
pub use secondary::{SecondaryClient, SecondaryConfig};

/// Outcome of a single upstream lookup.
pub type SourceResult = Result<EntryValue, SourceFailure>;

/// An upstream source that can resolve a key to an [`EntryValue`].
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Short name used in logs and failure messages.
    fn name(&self) -> &'static str;

    /// Upper bound on one `resolve` call. Callers enforce it as well.
    fn timeout(&self) -> Duration;

    async fn resolve(&self, key: &ReferenceKey) -> SourceResult;
}

/// Best-effort entity kind from a free-text tax regime description.
pub fn infer_kind_from_regime(regime: &str) -> EntityKind {
    let regime = regime.to_lowercase();
    let has = |needle: &str| regime.contains(needle);

    if has("cooperativa") {
        EntityKind::Cooperative
    } else if has("fideicomiso") {
        EntityKind::Trust
    } else if has("asociación") || has("asociacion") || has("fundación") || has("fundacion") {
        EntityKind::Nonprofit
    } else if has("física") || has("fisica") {
        EntityKind::Person
    } else if has("sociedad") || has("s.a.") || has("s.r.l") {
        EntityKind::Company
    } else {
        EntityKind::Other
    }
}
