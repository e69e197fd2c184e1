//! Background maintenance for the cache
//!
//! - `stale_refresh`: re-fetches entries in the refresh tier, most used first
//! - `expired_purge`: deletes entries past the maximum age
//! - `priority_refresh`: re-fetches heavily used entries regardless of tier
//!
//! # Usage
//!
//! ```ignore
//! use refcache_service::jobs::{maintenance_task, MaintenanceJobs};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let jobs = Arc::new(MaintenanceJobs::new(chain, classifier, config, alerts));
//! tokio::spawn(maintenance_task(jobs, schedule, shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod maintenance;

pub use maintenance::{
    maintenance_task, MaintenanceJobs, MaintenanceMetrics, MaintenanceSnapshot,
};

use refcache_core::RefcacheError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::constants::ALERT_FAILURE_RATE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    StaleRefresh,
    ExpiredPurge,
    PriorityRefresh,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::StaleRefresh => "stale_refresh",
            JobKind::ExpiredPurge => "expired_purge",
            JobKind::PriorityRefresh => "priority_refresh",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one job run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStats {
    pub job: JobKind,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub duration: Duration,
    /// (key, error) for each failed item, in processing order.
    pub errors: Vec<(String, String)>,
}

impl JobStats {
    pub fn empty(job: JobKind) -> Self {
        Self {
            job,
            processed: 0,
            succeeded: 0,
            failed: 0,
            duration: Duration::ZERO,
            errors: Vec::new(),
        }
    }

    pub fn failure_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.failed as f64 / self.processed as f64
        }
    }

    /// Strictly more than half of the processed items failed.
    pub fn should_alert(&self) -> bool {
        self.failure_rate() > ALERT_FAILURE_RATE
    }
}

#[derive(Debug, Clone, Error)]
pub enum JobError {
    #[error("{job} is already running")]
    AlreadyRunning { job: JobKind },

    #[error("{job} could not read or write the store: {source}")]
    Store {
        job: JobKind,
        #[source]
        source: RefcacheError,
    },
}
