//! Tracing subscriber setup
//!
//! Call [`init_tracing`] once at startup. Library code only emits
//! `tracing` events and never installs a subscriber itself.

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::constants::DEFAULT_LOG_FILTER;

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Human-readable lines for local development.
    Pretty,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub format: LogFormat,
    /// Explicit filter directive. `None` falls back to `RUST_LOG`, then
    /// `refcache=info`.
    pub filter: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            filter: None,
        }
    }
}

impl TelemetryConfig {
    /// Create TelemetryConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `REFCACHE_LOG_FORMAT`: `json` (default) or `pretty`
    /// - `REFCACHE_LOG_FILTER`: an `EnvFilter` directive such as `refcache=debug`
    pub fn from_env() -> Self {
        let format = match std::env::var("REFCACHE_LOG_FORMAT")
            .map(|s| s.trim().to_lowercase())
            .as_deref()
        {
            Ok("pretty") | Ok("text") => LogFormat::Pretty,
            _ => LogFormat::Json,
        };
        let filter = std::env::var("REFCACHE_LOG_FILTER")
            .ok()
            .filter(|s| !s.trim().is_empty());

        Self { format, filter }
    }

    pub fn development() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: Some("refcache=debug".to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Failed to init subscriber: {0}")]
    Init(String),
}

fn build_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    match &config.filter {
        Some(filter) => EnvFilter::try_new(filter).map_err(|e| TelemetryError::InvalidFilter {
            filter: filter.clone(),
            reason: e.to_string(),
        }),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))),
    }
}

/// Install the global subscriber.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = build_filter(config)?;
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    result.map_err(|e| TelemetryError::Init(e.to_string()))?;

    tracing::info!(format = ?config.format, filter = ?config.filter, "Telemetry initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EnvVarGuard {
        key: &'static str,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let original = std::env::var(key).ok();
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
            Self { key, original }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.original.as_deref() {
                Some(v) => std::env::set_var(self.key, v),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_telemetry_config_from_env() {
        let _format = EnvVarGuard::set("REFCACHE_LOG_FORMAT", Some("Pretty"));
        let _filter = EnvVarGuard::set("REFCACHE_LOG_FILTER", Some("refcache=trace"));
        let config = TelemetryConfig::from_env();
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.filter.as_deref(), Some("refcache=trace"));
    }

    #[test]
    fn test_invalid_filter_is_rejected() {
        let config = TelemetryConfig {
            format: LogFormat::Json,
            filter: Some("refcache=notalevel".to_string()),
        };
        assert!(matches!(
            build_filter(&config),
            Err(TelemetryError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn test_default_filter_builds() {
        assert!(build_filter(&TelemetryConfig::default()).is_ok());
    }
}
