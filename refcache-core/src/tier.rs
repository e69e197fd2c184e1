//! Freshness tiers.
//!
//! A tier is never stored. It is derived from `refreshed_at` and the current
//! time every time it is needed:
//!
//! | age (whole days)             | tier    |
//! |------------------------------|---------|
//! | `< refresh_after`            | Fresh   |
//! | `refresh_after..stale_after` | Refresh |
//! | `stale_after..=expire_after` | Stale   |
//! | `> expire_after`             | Expired |
//!
//! The predicates deliberately overlap: an entry in the Refresh tier is both
//! fresh (servable as-is) and due for a background refresh.

use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_REFRESH_AFTER_DAYS: i64 = 5;
pub const DEFAULT_STALE_AFTER_DAYS: i64 = 7;
pub const DEFAULT_EXPIRE_AFTER_DAYS: i64 = 90;

/// Freshness tier of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Fresh,
    Refresh,
    Stale,
    Expired,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Fresh => "fresh",
            Tier::Refresh => "refresh",
            Tier::Stale => "stale",
            Tier::Expired => "expired",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whole days elapsed between `refreshed_at` and `now`, floored and clamped at 0.
pub fn age_days(refreshed_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - refreshed_at).num_days().max(0)
}

/// Maps entry age to a tier using three day thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierClassifier {
    refresh_after_days: i64,
    stale_after_days: i64,
    expire_after_days: i64,
}

impl Default for TierClassifier {
    fn default() -> Self {
        Self {
            refresh_after_days: DEFAULT_REFRESH_AFTER_DAYS,
            stale_after_days: DEFAULT_STALE_AFTER_DAYS,
            expire_after_days: DEFAULT_EXPIRE_AFTER_DAYS,
        }
    }
}

impl TierClassifier {
    /// Build a classifier, requiring `0 <= refresh_after < stale_after <= expire_after`.
    pub fn new(
        refresh_after_days: i64,
        stale_after_days: i64,
        expire_after_days: i64,
    ) -> Result<Self, ConfigError> {
        if refresh_after_days < 0 {
            return Err(ConfigError::InvalidValue {
                field: "refresh_after_days".to_string(),
                value: refresh_after_days.to_string(),
                reason: "must not be negative".to_string(),
            });
        }
        if stale_after_days <= refresh_after_days {
            return Err(ConfigError::InvalidValue {
                field: "stale_after_days".to_string(),
                value: stale_after_days.to_string(),
                reason: format!("must exceed refresh_after_days ({})", refresh_after_days),
            });
        }
        if expire_after_days < stale_after_days {
            return Err(ConfigError::InvalidValue {
                field: "expire_after_days".to_string(),
                value: expire_after_days.to_string(),
                reason: format!("must be at least stale_after_days ({})", stale_after_days),
            });
        }
        Ok(Self {
            refresh_after_days,
            stale_after_days,
            expire_after_days,
        })
    }

    pub fn refresh_after_days(&self) -> i64 {
        self.refresh_after_days
    }

    pub fn stale_after_days(&self) -> i64 {
        self.stale_after_days
    }

    pub fn expire_after_days(&self) -> i64 {
        self.expire_after_days
    }

    pub fn classify(&self, age_days: i64) -> Tier {
        if age_days > self.expire_after_days {
            Tier::Expired
        } else if age_days >= self.stale_after_days {
            Tier::Stale
        } else if age_days >= self.refresh_after_days {
            Tier::Refresh
        } else {
            Tier::Fresh
        }
    }

    /// Servable without contacting any upstream.
    pub fn is_fresh(&self, age_days: i64) -> bool {
        age_days < self.stale_after_days
    }

    /// Servable, but a background refresh should be scheduled.
    pub fn needs_refresh(&self, age_days: i64) -> bool {
        age_days >= self.refresh_after_days && age_days < self.stale_after_days
    }

    /// Usable only as a degraded fallback when every source fails.
    pub fn is_stale(&self, age_days: i64) -> bool {
        age_days >= self.stale_after_days && age_days <= self.expire_after_days
    }

    /// Eligible for purge.
    pub fn is_expired(&self, age_days: i64) -> bool {
        age_days > self.expire_after_days
    }
}
