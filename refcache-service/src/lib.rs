//! refcache service layer
//!
//! Freshness-tiered lookups over a [`refcache_storage::CacheStore`], with
//! waterfall resolution through a rate-limited primary source and a
//! secondary fallback, decoupled background refresh, maintenance jobs,
//! batch resolution and per-scope health.

pub mod alert;
pub mod batch;
pub mod chain;
pub mod config;
pub mod constants;
pub mod health;
pub mod jobs;
pub mod resolver;
pub mod scheduler;
pub mod service;
pub mod telemetry;

pub use alert::{AlertSink, MaintenanceAlert, TracingAlertSink};
pub use batch::{BatchOutcome, BatchRunner, BatchSummary};
pub use chain::{ChainFailure, Fetched, RefreshError, SourceChain};
pub use config::{
    BatchConfig, MaintenanceConfig, MaintenanceSchedule, RefreshConfig, ServiceConfig, TierPolicy,
};
pub use health::{HealthReport, TopKey};
pub use jobs::{maintenance_task, JobError, JobKind, JobStats, MaintenanceJobs};
pub use resolver::WaterfallResolver;
pub use scheduler::{EnqueueOutcome, RefreshScheduler, ScheduledTask, Scheduler, TokioScheduler};
pub use service::{Dependencies, Refcache};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig, TelemetryError};
