//! Service configuration
//!
//! Each struct has a `Default`, a `from_env()` reading `REFCACHE_*`
//! variables (unparseable values fall back to the default) and a
//! `development()` preset with short intervals for local runs.

use std::str::FromStr;
use std::time::Duration;

use refcache_core::{
    ConfigError, TierClassifier, DEFAULT_EXPIRE_AFTER_DAYS, DEFAULT_REFRESH_AFTER_DAYS,
    DEFAULT_STALE_AFTER_DAYS,
};
use refcache_sources::{PrimaryConfig, RateLimitConfig, SecondaryConfig};

use crate::constants::{
    DEFAULT_BATCH_DELAY_MS, DEFAULT_MAINTENANCE_BATCH_SIZE, DEFAULT_MAINTENANCE_DELAY_MS,
    DEFAULT_MAINTENANCE_MAX_AGE_DAYS, DEFAULT_PRIORITY_THRESHOLD, DEFAULT_REFRESH_DELAY_MS,
    DEFAULT_SCHEDULE_PRIORITY_SECS, DEFAULT_SCHEDULE_PURGE_SECS,
    DEFAULT_SCHEDULE_STALE_REFRESH_SECS,
};

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|s| matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

// ============================================================================
// TIERS
// ============================================================================

/// Day thresholds for the freshness tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPolicy {
    pub refresh_after_days: i64,
    pub stale_after_days: i64,
    pub expire_after_days: i64,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            refresh_after_days: DEFAULT_REFRESH_AFTER_DAYS,
            stale_after_days: DEFAULT_STALE_AFTER_DAYS,
            expire_after_days: DEFAULT_EXPIRE_AFTER_DAYS,
        }
    }
}

impl TierPolicy {
    /// Create TierPolicy from environment variables.
    ///
    /// # Environment Variables
    /// - `REFCACHE_TIER_REFRESH_AFTER_DAYS` (default: 5)
    /// - `REFCACHE_TIER_STALE_AFTER_DAYS` (default: 7)
    /// - `REFCACHE_TIER_EXPIRE_AFTER_DAYS` (default: 90)
    pub fn from_env() -> Self {
        Self {
            refresh_after_days: env_or(
                "REFCACHE_TIER_REFRESH_AFTER_DAYS",
                DEFAULT_REFRESH_AFTER_DAYS,
            ),
            stale_after_days: env_or("REFCACHE_TIER_STALE_AFTER_DAYS", DEFAULT_STALE_AFTER_DAYS),
            expire_after_days: env_or(
                "REFCACHE_TIER_EXPIRE_AFTER_DAYS",
                DEFAULT_EXPIRE_AFTER_DAYS,
            ),
        }
    }

    pub fn classifier(&self) -> Result<TierClassifier, ConfigError> {
        TierClassifier::new(
            self.refresh_after_days,
            self.stale_after_days,
            self.expire_after_days,
        )
    }
}

// ============================================================================
// BACKGROUND REFRESH
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshConfig {
    /// Delay before an enqueued refresh starts (default: 0)
    pub delay: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(DEFAULT_REFRESH_DELAY_MS),
        }
    }
}

impl RefreshConfig {
    /// Reads `REFCACHE_REFRESH_DELAY_MS`.
    pub fn from_env() -> Self {
        Self {
            delay: Duration::from_millis(env_or(
                "REFCACHE_REFRESH_DELAY_MS",
                DEFAULT_REFRESH_DELAY_MS,
            )),
        }
    }
}

// ============================================================================
// MAINTENANCE
// ============================================================================

/// Parameters of the maintenance job runs.
#[derive(Debug, Clone, PartialEq)]
pub struct MaintenanceConfig {
    /// Maximum entries processed by one refresh run (default: 100)
    pub batch_size: usize,

    /// Priority refresh picks entries accessed more than this (default: 10)
    pub priority_threshold: u64,

    /// Purge deletes entries older than this many days (default: 90)
    pub max_age_days: i64,

    /// Pause between upstream calls in a run (default: 100ms)
    pub call_delay: Duration,

    /// Whether stale refresh also picks entries already past the stale
    /// threshold (default: false, only the refresh tier)
    pub include_stale: bool,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_MAINTENANCE_BATCH_SIZE,
            priority_threshold: DEFAULT_PRIORITY_THRESHOLD,
            max_age_days: DEFAULT_MAINTENANCE_MAX_AGE_DAYS,
            call_delay: Duration::from_millis(DEFAULT_MAINTENANCE_DELAY_MS),
            include_stale: false,
        }
    }
}

impl MaintenanceConfig {
    /// Create MaintenanceConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `REFCACHE_MAINTENANCE_BATCH_SIZE` (default: 100)
    /// - `REFCACHE_MAINTENANCE_PRIORITY_THRESHOLD` (default: 10)
    /// - `REFCACHE_MAINTENANCE_MAX_AGE_DAYS` (default: 90)
    /// - `REFCACHE_MAINTENANCE_DELAY_MS` (default: 100)
    /// - `REFCACHE_MAINTENANCE_INCLUDE_STALE` (default: false)
    pub fn from_env() -> Self {
        Self {
            batch_size: env_or(
                "REFCACHE_MAINTENANCE_BATCH_SIZE",
                DEFAULT_MAINTENANCE_BATCH_SIZE,
            ),
            priority_threshold: env_or(
                "REFCACHE_MAINTENANCE_PRIORITY_THRESHOLD",
                DEFAULT_PRIORITY_THRESHOLD,
            ),
            max_age_days: env_or(
                "REFCACHE_MAINTENANCE_MAX_AGE_DAYS",
                DEFAULT_MAINTENANCE_MAX_AGE_DAYS,
            ),
            call_delay: Duration::from_millis(env_or(
                "REFCACHE_MAINTENANCE_DELAY_MS",
                DEFAULT_MAINTENANCE_DELAY_MS,
            )),
            include_stale: env_flag("REFCACHE_MAINTENANCE_INCLUDE_STALE", false),
        }
    }

    /// Small batches and no pacing.
    pub fn development() -> Self {
        Self {
            batch_size: 10,
            call_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// How often each maintenance job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceSchedule {
    pub stale_refresh_interval: Duration,
    pub purge_interval: Duration,
    pub priority_refresh_interval: Duration,
}

impl Default for MaintenanceSchedule {
    fn default() -> Self {
        Self {
            stale_refresh_interval: Duration::from_secs(DEFAULT_SCHEDULE_STALE_REFRESH_SECS),
            purge_interval: Duration::from_secs(DEFAULT_SCHEDULE_PURGE_SECS),
            priority_refresh_interval: Duration::from_secs(DEFAULT_SCHEDULE_PRIORITY_SECS),
        }
    }
}

impl MaintenanceSchedule {
    /// Create MaintenanceSchedule from environment variables.
    ///
    /// # Environment Variables
    /// - `REFCACHE_SCHEDULE_STALE_REFRESH_SECS` (default: 21600)
    /// - `REFCACHE_SCHEDULE_PURGE_SECS` (default: 86400)
    /// - `REFCACHE_SCHEDULE_PRIORITY_SECS` (default: 43200)
    pub fn from_env() -> Self {
        Self {
            stale_refresh_interval: Duration::from_secs(env_or(
                "REFCACHE_SCHEDULE_STALE_REFRESH_SECS",
                DEFAULT_SCHEDULE_STALE_REFRESH_SECS,
            )),
            purge_interval: Duration::from_secs(env_or(
                "REFCACHE_SCHEDULE_PURGE_SECS",
                DEFAULT_SCHEDULE_PURGE_SECS,
            )),
            priority_refresh_interval: Duration::from_secs(env_or(
                "REFCACHE_SCHEDULE_PRIORITY_SECS",
                DEFAULT_SCHEDULE_PRIORITY_SECS,
            )),
        }
    }

    pub fn development() -> Self {
        Self {
            stale_refresh_interval: Duration::from_secs(60),
            purge_interval: Duration::from_secs(300),
            priority_refresh_interval: Duration::from_secs(120),
        }
    }
}

// ============================================================================
// BATCH
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Pause between keys (default: 100ms)
    pub delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(DEFAULT_BATCH_DELAY_MS),
        }
    }
}

impl BatchConfig {
    /// Reads `REFCACHE_BATCH_DELAY_MS`.
    pub fn from_env() -> Self {
        Self {
            delay: Duration::from_millis(env_or("REFCACHE_BATCH_DELAY_MS", DEFAULT_BATCH_DELAY_MS)),
        }
    }
}

// ============================================================================
// AGGREGATE
// ============================================================================

/// Everything needed to assemble a resolver, its jobs and its sources.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub tiers: TierPolicy,
    pub rate_limit: RateLimitConfig,
    pub primary: PrimaryConfig,
    pub secondary: SecondaryConfig,
    pub refresh: RefreshConfig,
    pub maintenance: MaintenanceConfig,
    pub schedule: MaintenanceSchedule,
    pub batch: BatchConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self {
            tiers: TierPolicy::from_env(),
            rate_limit: RateLimitConfig::from_env(),
            primary: PrimaryConfig::from_env(),
            secondary: SecondaryConfig::from_env(),
            refresh: RefreshConfig::from_env(),
            maintenance: MaintenanceConfig::from_env(),
            schedule: MaintenanceSchedule::from_env(),
            batch: BatchConfig::from_env(),
        }
    }

    pub fn development() -> Self {
        Self {
            maintenance: MaintenanceConfig::development(),
            schedule: MaintenanceSchedule::development(),
            batch: BatchConfig {
                delay: Duration::ZERO,
            },
            ..Self::default()
        }
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tiers.classifier()?;

        if self.rate_limit.per_second == 0 {
            return Err(invalid("rate_limit.per_second", "0", "must be positive"));
        }
        if self.rate_limit.burst == 0 {
            return Err(invalid("rate_limit.burst", "0", "must be positive"));
        }
        if self.maintenance.batch_size == 0 {
            return Err(invalid("maintenance.batch_size", "0", "must be positive"));
        }
        if self.maintenance.max_age_days < 0 {
            return Err(invalid(
                "maintenance.max_age_days",
                &self.maintenance.max_age_days.to_string(),
                "must not be negative",
            ));
        }
        if self.primary.timeout.is_zero() {
            return Err(invalid("primary.timeout", "0", "must be positive"));
        }
        if self.secondary.timeout.is_zero() {
            return Err(invalid("secondary.timeout", "0", "must be positive"));
        }

        let schedule = [
            ("schedule.stale_refresh_interval", self.schedule.stale_refresh_interval),
            ("schedule.purge_interval", self.schedule.purge_interval),
            ("schedule.priority_refresh_interval", self.schedule.priority_refresh_interval),
        ];
        for (field, interval) in schedule {
            if interval.is_zero() {
                return Err(invalid(field, "0", "must be positive"));
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
