//! Cache health types
//!
//! Per-scope summary of how much of the cache can be served without
//! contacting an upstream source.

use crate::tier::Tier;
use serde::{Deserialize, Serialize};

/// Health status of a scope's cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Coverage and expiry are within normal bounds
    Healthy,
    /// Coverage is low or expired entries are accumulating
    Degraded,
    /// Most lookups will need an upstream call
    Unhealthy,
    /// No entries to judge from
    Unknown,
}

/// Entry counts per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub fresh: u64,
    pub refresh: u64,
    pub stale: u64,
    pub expired: u64,
}

impl TierCounts {
    pub fn record(&mut self, tier: Tier) {
        match tier {
            Tier::Fresh => self.fresh += 1,
            Tier::Refresh => self.refresh += 1,
            Tier::Stale => self.stale += 1,
            Tier::Expired => self.expired += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.fresh + self.refresh + self.stale + self.expired
    }

    /// Share of entries servable without an upstream call, as a percentage.
    pub fn coverage_pct(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.fresh + self.refresh) as f64 / total as f64 * 100.0
    }

    pub fn expired_pct(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.expired as f64 / total as f64 * 100.0
    }
}
