//! Per-scope cache health and usage reporting.

use chrono::{DateTime, Utc};
use refcache_core::{HealthStatus, RefcacheResult, ScopeId, Tier, TierCounts};
use refcache_sources::RateLimiterSnapshot;
use serde::Serialize;

use crate::constants::{
    CRITICAL_COVERAGE_PCT, CRITICAL_EXPIRED_PCT, DEGRADED_COVERAGE_PCT, DEGRADED_EXPIRED_PCT,
    MAX_ESTIMATED_HIT_RATE,
};
use crate::resolver::WaterfallResolver;

/// Health of one scope's cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub scope: ScopeId,
    pub status: HealthStatus,
    pub total_entries: u64,
    pub tiers: TierCounts,
    /// Percent of entries in the fresh or refresh tier.
    pub coverage_pct: f64,
    pub expired_pct: f64,
    /// Heuristic percent of lookups expected to be served from cache.
    pub estimated_hit_rate: f64,
    pub avg_age_days: f64,
    pub avg_access_count: f64,
    pub rate_limiter: RateLimiterSnapshot,
    pub refreshes_in_flight: usize,
    pub generated_at: DateTime<Utc>,
}

/// A frequently used entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopKey {
    pub key: String,
    pub display_name: String,
    pub access_count: u64,
    pub age_days: i64,
    pub tier: Tier,
    pub last_access_at: Option<DateTime<Utc>>,
}

/// Status from tier counts. Critical thresholds map to `Unhealthy`.
pub fn assess(tiers: &TierCounts) -> HealthStatus {
    if tiers.total() == 0 {
        return HealthStatus::Unknown;
    }
    let coverage = tiers.coverage_pct();
    let expired = tiers.expired_pct();
    if coverage < CRITICAL_COVERAGE_PCT || expired > CRITICAL_EXPIRED_PCT {
        HealthStatus::Unhealthy
    } else if coverage < DEGRADED_COVERAGE_PCT || expired > DEGRADED_EXPIRED_PCT {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

/// `min(95, coverage * 0.9 + avg_access * 0.5)`
pub fn estimated_hit_rate(coverage_pct: f64, avg_access_count: f64) -> f64 {
    (coverage_pct * 0.9 + avg_access_count * 0.5).min(MAX_ESTIMATED_HIT_RATE)
}

impl WaterfallResolver {
    /// Summarize the cache for `scope`. Reads do not count as accesses.
    pub async fn health(&self, scope: &ScopeId) -> RefcacheResult<HealthReport> {
        let now = self.clock().now();
        let entries = self.store().list_scope(scope).await?;

        let mut tiers = TierCounts::default();
        let mut age_sum = 0i64;
        let mut access_sum = 0u64;
        for entry in &entries {
            let age = entry.age_days(now);
            tiers.record(self.classifier().classify(age));
            age_sum += age;
            access_sum += entry.access_count;
        }

        let total = tiers.total();
        let (avg_age_days, avg_access_count) = if total == 0 {
            (0.0, 0.0)
        } else {
            (age_sum as f64 / total as f64, access_sum as f64 / total as f64)
        };
        let coverage_pct = tiers.coverage_pct();
        let status = assess(&tiers);

        if matches!(status, HealthStatus::Degraded | HealthStatus::Unhealthy) {
            tracing::warn!(
                scope = %scope,
                status = ?status,
                coverage_pct,
                expired = tiers.expired,
                "Cache health below target"
            );
        }

        Ok(HealthReport {
            scope: scope.clone(),
            status,
            total_entries: total,
            tiers,
            coverage_pct,
            expired_pct: tiers.expired_pct(),
            estimated_hit_rate: if total == 0 {
                0.0
            } else {
                estimated_hit_rate(coverage_pct, avg_access_count)
            },
            avg_age_days,
            avg_access_count,
            rate_limiter: self.chain().limiter().snapshot(),
            refreshes_in_flight: self.refresher().in_flight(),
            generated_at: now,
        })
    }

    /// The `limit` most accessed entries in `scope`.
    pub async fn top_keys(&self, scope: &ScopeId, limit: usize) -> RefcacheResult<Vec<TopKey>> {
        let now = self.clock().now();
        let mut entries = self.store().list_scope(scope).await?;
        entries.sort_by(|a, b| {
            b.access_count
                .cmp(&a.access_count)
                .then_with(|| a.key.cmp(&b.key))
        });

        Ok(entries
            .into_iter()
            .take(limit)
            .map(|entry| {
                let age_days = entry.age_days(now);
                TopKey {
                    key: entry.key.to_string(),
                    display_name: entry.value.display_name,
                    access_count: entry.access_count,
                    age_days,
                    tier: self.classifier().classify(age_days),
                    last_access_at: entry.last_access_at,
                }
            })
            .collect())
    }
}
