//! Fallback directory HTTP client

use super::types::{normalize, DirectoryResponse};
use crate::failure::SourceFailure;
use crate::SourceClient;
use async_trait::async_trait;
use refcache_core::{ConfigError, EntryValue, ErrorKind, ReferenceKey};
use reqwest::Client;
use std::time::Duration;

pub const DEFAULT_SECONDARY_URL: &str = "https://apis.gometa.org/cedulas";
pub const DEFAULT_SECONDARY_TIMEOUT_MS: u64 = 3_000;

const SOURCE_NAME: &str = "secondary";

/// Configuration for the fallback directory client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for SecondaryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SECONDARY_URL.to_string(),
            timeout: Duration::from_millis(DEFAULT_SECONDARY_TIMEOUT_MS),
        }
    }
}

impl SecondaryConfig {
    /// Create SecondaryConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `REFCACHE_SECONDARY_URL`: Directory base URL; the key is appended as a path segment
    /// - `REFCACHE_SECONDARY_TIMEOUT_MS`: Request timeout (default: 3000)
    pub fn from_env() -> Self {
        let base_url = std::env::var("REFCACHE_SECONDARY_URL")
            .unwrap_or_else(|_| DEFAULT_SECONDARY_URL.to_string());

        let timeout = Duration::from_millis(
            std::env::var("REFCACHE_SECONDARY_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SECONDARY_TIMEOUT_MS),
        );

        Self { base_url, timeout }
    }
}

/// Client for the fallback directory.
pub struct SecondaryClient {
    client: Client,
    config: SecondaryConfig,
}

impl SecondaryClient {
    pub fn new(config: SecondaryConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient {
                source_name: SOURCE_NAME.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self { client, config })
    }

    fn url_for(&self, key: &ReferenceKey) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), key)
    }
}

#[async_trait]
impl SourceClient for SecondaryClient {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }

    async fn resolve(&self, key: &ReferenceKey) -> Result<EntryValue, SourceFailure> {
        let response = self
            .client
            .get(self.url_for(key))
            .send()
            .await
            .map_err(|e| SourceFailure::from_transport(SOURCE_NAME, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceFailure::from_status(SOURCE_NAME, status, &body));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SourceFailure::from_transport(SOURCE_NAME, &e))?;
        let parsed: DirectoryResponse = serde_json::from_value(raw.clone()).map_err(|e| {
            SourceFailure::new(
                ErrorKind::Unknown,
                format!("{} returned an unexpected payload: {}", SOURCE_NAME, e),
            )
        })?;

        normalize(parsed, raw)
    }
}

impl std::fmt::Debug for SecondaryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecondaryClient")
            .field("base_url", &self.config.base_url)
            .field("timeout", &self.config.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_appends_key_once() {
        let client = SecondaryClient::new(SecondaryConfig {
            base_url: "https://example.test/cedulas/".to_string(),
            timeout: Duration::from_secs(3),
        })
        .unwrap();
        let key = ReferenceKey::parse("3-101-123456").unwrap();
        assert_eq!(client.url_for(&key), "https://example.test/cedulas/3101123456");
    }

    #[test]
    fn test_default_timeout_is_three_seconds() {
        assert_eq!(SecondaryConfig::default().timeout, Duration::from_secs(3));
    }
}
