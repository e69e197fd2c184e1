//! Constants for the refcache service layer
//!
//! Defaults for every service-level configuration struct live here.

// ============================================================================
// BACKGROUND REFRESH
// ============================================================================

/// Delay before an enqueued background refresh starts (milliseconds)
pub const DEFAULT_REFRESH_DELAY_MS: u64 = 0;

// ============================================================================
// MAINTENANCE JOBS
// ============================================================================

/// Maximum entries processed by one refresh job run
pub const DEFAULT_MAINTENANCE_BATCH_SIZE: usize = 100;

/// Entries accessed more often than this are refreshed by the priority job
pub const DEFAULT_PRIORITY_THRESHOLD: u64 = 10;

/// Entries older than this many days are purged
pub const DEFAULT_MAINTENANCE_MAX_AGE_DAYS: i64 = 90;

/// Pause between upstream calls inside a job run (milliseconds)
pub const DEFAULT_MAINTENANCE_DELAY_MS: u64 = 100;

/// Failure rate above which a job run raises an alert
pub const ALERT_FAILURE_RATE: f64 = 0.5;

/// Sample errors carried by one alert
pub const ALERT_MAX_SAMPLES: usize = 5;

/// Characters kept per sample error in an alert
pub const ALERT_SAMPLE_CHARS: usize = 100;

// ============================================================================
// MAINTENANCE SCHEDULE
// ============================================================================

/// Stale refresh interval (6 hours)
pub const DEFAULT_SCHEDULE_STALE_REFRESH_SECS: u64 = 21_600;

/// Expired purge interval (24 hours)
pub const DEFAULT_SCHEDULE_PURGE_SECS: u64 = 86_400;

/// Priority refresh interval (12 hours)
pub const DEFAULT_SCHEDULE_PRIORITY_SECS: u64 = 43_200;

// ============================================================================
// BATCH RESOLUTION
// ============================================================================

/// Pause between keys in a batch (milliseconds)
pub const DEFAULT_BATCH_DELAY_MS: u64 = 100;

// ============================================================================
// HEALTH
// ============================================================================

/// Coverage below this percentage is critical
pub const CRITICAL_COVERAGE_PCT: f64 = 50.0;

/// Coverage below this percentage is degraded
pub const DEGRADED_COVERAGE_PCT: f64 = 70.0;

/// Expired share above this percentage is critical
pub const CRITICAL_EXPIRED_PCT: f64 = 20.0;

/// Expired share above this percentage is degraded
pub const DEGRADED_EXPIRED_PCT: f64 = 10.0;

/// Ceiling of the estimated hit rate (percent)
pub const MAX_ESTIMATED_HIT_RATE: f64 = 95.0;

// ============================================================================
// TELEMETRY
// ============================================================================

/// Log filter used when neither `REFCACHE_LOG_FILTER` nor `RUST_LOG` is set
pub const DEFAULT_LOG_FILTER: &str = "refcache=info";
