//! Cache entry and resolved value types.

use crate::key::{ReferenceKey, ScopeId};
use crate::tier::{age_days, Tier, TierClassifier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum stored length of `last_error`, in characters.
pub const MAX_ERROR_CHARS: usize = 500;

/// Registration status reported by the upstream registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Active,
    Inactive,
    Unknown,
}

/// Kind of legal entity behind an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    Company,
    Cooperative,
    Trust,
    Nonprofit,
    Other,
}

/// One activity or classification code attached to an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub code: String,
    pub description: String,
}

/// Normalized descriptive data for an identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryValue {
    pub display_name: String,
    /// Ordered; the first element is the primary classification.
    pub classifications: Vec<Classification>,
    pub status: EntityStatus,
    pub kind: EntityKind,
    pub regime: Option<String>,
    /// Raw upstream payload, kept for diagnostics only.
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl EntryValue {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            classifications: Vec::new(),
            status: EntityStatus::Active,
            kind: EntityKind::Other,
            regime: None,
            raw: serde_json::Value::Null,
        }
    }

    pub fn with_classification(
        mut self,
        code: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.classifications.push(Classification {
            code: code.into(),
            description: description.into(),
        });
        self
    }

    pub fn with_status(mut self, status: EntityStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_kind(mut self, kind: EntityKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_regime(mut self, regime: impl Into<String>) -> Self {
        self.regime = Some(regime.into());
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = raw;
        self
    }

    pub fn primary_classification(&self) -> Option<&Classification> {
        self.classifications.first()
    }
}

/// Where an entry's current value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Primary,
    Secondary,
    Manual,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provenance::Primary => "primary",
            Provenance::Secondary => "secondary",
            Provenance::Manual => "manual",
        })
    }
}

/// The persisted record, one per (key, scope).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: ReferenceKey,
    pub scope: ScopeId,
    pub value: EntryValue,
    pub provenance: Provenance,
    /// Set on creation, never changed afterwards.
    pub fetched_at: DateTime<Utc>,
    /// Reset on every successful resolution. Drives the tier.
    pub refreshed_at: DateTime<Utc>,
    pub access_count: u64,
    pub last_access_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl CacheEntry {
    /// A brand new entry created at `now`.
    pub fn new(
        key: ReferenceKey,
        scope: ScopeId,
        value: EntryValue,
        provenance: Provenance,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            scope,
            value,
            provenance,
            fetched_at: now,
            refreshed_at: now,
            access_count: 0,
            last_access_at: None,
            last_error: None,
        }
    }

    /// Replace the value after a successful resolution.
    ///
    /// `fetched_at` is kept. `refreshed_at` never moves backwards, so a
    /// clock step back cannot break `fetched_at <= refreshed_at`.
    pub fn apply_refresh(&mut self, value: EntryValue, provenance: Provenance, now: DateTime<Utc>) {
        self.value = value;
        self.provenance = provenance;
        self.refreshed_at = now.max(self.fetched_at);
        self.last_error = None;
    }

    pub fn record_access(&mut self, now: DateTime<Utc>) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_access_at = Some(now);
    }

    pub fn record_failure(&mut self, message: &str) {
        self.last_error = Some(truncate_chars(message, MAX_ERROR_CHARS));
    }

    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        age_days(self.refreshed_at, now)
    }

    pub fn tier(&self, classifier: &TierClassifier, now: DateTime<Utc>) -> Tier {
        classifier.classify(self.age_days(now))
    }
}

/// Truncate to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
