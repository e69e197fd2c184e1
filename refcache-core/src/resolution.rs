//! The normalized outcome of a lookup.

use crate::entry::EntryValue;
use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Which step of the waterfall produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Cache,
    Primary,
    Secondary,
    StaleCache,
    Failed,
}

impl ResolutionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionSource::Cache => "cache",
            ResolutionSource::Primary => "primary",
            ResolutionSource::Secondary => "secondary",
            ResolutionSource::StaleCache => "stale_cache",
            ResolutionSource::Failed => "failed",
        }
    }

    /// Whether an upstream source was called successfully.
    pub fn is_upstream(&self) -> bool {
        matches!(self, ResolutionSource::Primary | ResolutionSource::Secondary)
    }
}

impl fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    /// The key as it was given by the caller.
    pub key: String,
    pub success: bool,
    pub source: ResolutionSource,
    pub degraded: bool,
    pub value: Option<EntryValue>,
    /// Age of the served cache entry, when one was served.
    pub age_days: Option<i64>,
    pub warning: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// Human-actionable explanation of a failure.
    pub message: Option<String>,
    pub manual_entry_required: bool,
    pub refresh_enqueued: bool,
    pub elapsed: Duration,
}

impl ResolutionResult {
    pub fn cached(key: impl Into<String>, value: EntryValue, age_days: i64) -> Self {
        Self {
            key: key.into(),
            success: true,
            source: ResolutionSource::Cache,
            degraded: false,
            value: Some(value),
            age_days: Some(age_days),
            warning: None,
            error_kind: None,
            message: None,
            manual_entry_required: false,
            refresh_enqueued: false,
            elapsed: Duration::ZERO,
        }
    }

    pub fn upstream(key: impl Into<String>, source: ResolutionSource, value: EntryValue) -> Self {
        Self {
            key: key.into(),
            success: true,
            source,
            degraded: false,
            value: Some(value),
            age_days: Some(0),
            warning: None,
            error_kind: None,
            message: None,
            manual_entry_required: false,
            refresh_enqueued: false,
            elapsed: Duration::ZERO,
        }
    }

    pub fn stale(key: impl Into<String>, value: EntryValue, age_days: i64) -> Self {
        Self {
            key: key.into(),
            success: true,
            source: ResolutionSource::StaleCache,
            degraded: true,
            value: Some(value),
            age_days: Some(age_days),
            warning: Some(format!("data is {} days old", age_days)),
            error_kind: None,
            message: None,
            manual_entry_required: false,
            refresh_enqueued: false,
            elapsed: Duration::ZERO,
        }
    }

    pub fn failed(key: impl Into<String>, error_kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            success: false,
            source: ResolutionSource::Failed,
            degraded: false,
            value: None,
            age_days: None,
            warning: None,
            error_kind: Some(error_kind),
            message: Some(message.into()),
            manual_entry_required: true,
            refresh_enqueued: false,
            elapsed: Duration::ZERO,
        }
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub fn with_refresh_enqueued(mut self, enqueued: bool) -> Self {
        self.refresh_enqueued = enqueued;
        self
    }
}
