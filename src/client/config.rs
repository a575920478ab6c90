//! Client configuration.

use crate::protocol::constants::{DEFAULT_CHANGES_RETRY_DELAY, DEFAULT_HEARTBEAT_MS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration shared by every request a [`Database`](super::Database) issues.
///
/// Deserializes from any serde format; missing fields take their defaults.
///
/// ```
/// use couchdb_http::client::ClientConfig;
///
/// let config: ClientConfig = serde_json::from_str(r#"{"max_retries": 5}"#).unwrap();
/// assert_eq!(config.max_retries, 5);
/// assert_eq!(config.changes_retry_delay_ms, 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Retries of idempotent requests on transient failures
    pub max_retries: u32,
    /// Base delay of the exponential backoff between those retries, in milliseconds
    pub retry_delay_ms: u64,
    /// Fixed delay between changes feed reconnection attempts, in milliseconds
    pub changes_retry_delay_ms: u64,
    /// Feed heartbeat used when the options carry none, in milliseconds
    pub default_heartbeat_ms: i64,
    /// Whole-request timeout for document and view requests, in milliseconds
    pub request_timeout_ms: u64,
    /// Idle connections kept per host by the request client
    pub max_total_connections: u32,
    /// Proxy for document and view requests; empty disables it
    pub proxy_url: String,
    /// Emit `tracing` events for retries and feed failures
    pub enable_logging: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            max_retries: 3,
            retry_delay_ms: 100,
            changes_retry_delay_ms: DEFAULT_CHANGES_RETRY_DELAY.as_millis() as u64,
            default_heartbeat_ms: DEFAULT_HEARTBEAT_MS,
            request_timeout_ms: 30_000,
            max_total_connections: 10,
            proxy_url: String::new(),
            enable_logging: true,
        }
    }
}

impl ClientConfig {
    /// Feed reconnection delay as a [`Duration`].
    pub fn changes_retry_delay(&self) -> Duration {
        Duration::from_millis(self.changes_retry_delay_ms)
    }

    /// Build the request client described by this configuration.
    pub(crate) fn build_http_client(&self) -> reqwest::Client {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_millis(self.request_timeout_ms))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(self.max_total_connections as usize)
            .user_agent(crate::protocol::constants::headers::USER_AGENT);

        if !self.proxy_url.is_empty() {
            match reqwest::Proxy::all(&self.proxy_url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(e) if self.enable_logging => {
                    tracing::warn!("Ignoring invalid proxy {}: {}", self.proxy_url, e);
                }
                Err(_) => {}
            }
        }

        builder.build().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.default_heartbeat_ms, 5000);
        assert_eq!(config.changes_retry_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_deserialize() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"enable_logging": false, "proxy_url": "http://proxy:3128"}"#)
                .unwrap();
        assert!(!config.enable_logging);
        assert_eq!(config.proxy_url, "http://proxy:3128");
        assert_eq!(config.request_timeout_ms, 30_000);
    }
}
