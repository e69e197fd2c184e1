//! Operator alerts raised by maintenance jobs.

use async_trait::async_trait;
use refcache_core::truncate_chars;
use serde::Serialize;
use std::time::Duration;

use crate::constants::{ALERT_MAX_SAMPLES, ALERT_SAMPLE_CHARS};
use crate::jobs::JobStats;

/// Payload delivered when a job run fails for too many keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaintenanceAlert {
    pub job: &'static str,
    pub processed: u64,
    pub failed: u64,
    pub failure_rate: f64,
    pub duration: Duration,
    /// `key: error` lines, at most five, each cut to 100 characters.
    pub samples: Vec<String>,
}

impl MaintenanceAlert {
    pub fn from_stats(stats: &JobStats) -> Self {
        Self {
            job: stats.job.as_str(),
            processed: stats.processed,
            failed: stats.failed,
            failure_rate: stats.failure_rate(),
            duration: stats.duration,
            samples: stats
                .errors
                .iter()
                .take(ALERT_MAX_SAMPLES)
                .map(|(key, error)| truncate_chars(&format!("{}: {}", key, error), ALERT_SAMPLE_CHARS))
                .collect(),
        }
    }
}

/// Destination for maintenance alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, alert: MaintenanceAlert);
}

/// Logs alerts at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn send(&self, alert: MaintenanceAlert) {
        tracing::error!(
            job = alert.job,
            processed = alert.processed,
            failed = alert.failed,
            failure_rate = alert.failure_rate,
            duration_ms = alert.duration.as_millis() as u64,
            samples = ?alert.samples,
            "Maintenance job failure rate above threshold"
        );
    }
}
