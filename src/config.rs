//! Feed configuration: per-venue endpoints plus the timing knobs for
//! transport retry, debounce, and polling. All fields have production
//! defaults so `FeedConfig::default()` talks to the real venues; tests
//! override endpoints and timings with a JSON blob.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::Venue;

/// Root configuration for the feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_okx_endpoints")]
    pub okx: VenueEndpoints,
    #[serde(default = "default_bybit_endpoints")]
    pub bybit: VenueEndpoints,
    #[serde(default = "default_deribit_endpoints")]
    pub deribit: VenueEndpoints,
    #[serde(default)]
    pub transport: TransportConfig,
    /// Quiet window applied to bursty book updates before publishing.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Fixed interval of the REST fallback loop.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            okx: default_okx_endpoints(),
            bybit: default_bybit_endpoints(),
            deribit: default_deribit_endpoints(),
            transport: TransportConfig::default(),
            debounce_ms: default_debounce_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl FeedConfig {
    pub fn endpoints(&self, venue: Venue) -> &VenueEndpoints {
        match venue {
            Venue::Okx => &self.okx,
            Venue::Bybit => &self.bybit,
            Venue::Deribit => &self.deribit,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Streaming and REST endpoints for one venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueEndpoints {
    pub ws_url: String,
    pub rest_url: String,
}

/// One retry policy, applied uniformly across venues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Deadline for a single open attempt.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Re-open attempts allowed after abnormal closures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Linear backoff step: attempt N waits N times this long.
    #[serde(default = "default_backoff_step_ms")]
    pub backoff_step_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            connect_timeout_ms: default_connect_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_step_ms: default_backoff_step_ms(),
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn backoff_step(&self) -> Duration {
        Duration::from_millis(self.backoff_step_ms)
    }
}

/// Load a configuration from a JSON string.
pub fn load_config_from_str(raw: &str) -> Result<FeedConfig, serde_json::Error> {
    serde_json::from_str(raw)
}

// Default value functions for serde

fn default_okx_endpoints() -> VenueEndpoints {
    VenueEndpoints {
        ws_url: "wss://ws.okx.com:8443/ws/v5/public".to_string(),
        rest_url: "https://www.okx.com".to_string(),
    }
}

fn default_bybit_endpoints() -> VenueEndpoints {
    VenueEndpoints {
        ws_url: "wss://stream.bybit.com/v5/public/linear".to_string(),
        rest_url: "https://api.bybit.com".to_string(),
    }
}

fn default_deribit_endpoints() -> VenueEndpoints {
    VenueEndpoints {
        ws_url: "wss://www.deribit.com/ws/api/v2".to_string(),
        rest_url: "https://www.deribit.com".to_string(),
    }
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_step_ms() -> u64 {
    1000
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_poll_interval_ms() -> u64 {
    2000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FeedConfig::default();
        assert_eq!(config.transport.max_retries, 3);
        assert_eq!(config.debounce(), Duration::from_millis(100));
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert!(config.endpoints(Venue::Okx).ws_url.starts_with("wss://"));
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config = load_config_from_str(
            r#"{
                "bybit": {"ws_url": "ws://localhost:9001", "rest_url": "http://localhost:9002"},
                "transport": {"max_retries": 1},
                "debounce_ms": 20
            }"#,
        )
        .unwrap();

        assert_eq!(config.bybit.ws_url, "ws://localhost:9001");
        assert_eq!(config.transport.max_retries, 1);
        assert_eq!(config.transport.connect_timeout_ms, 5000);
        assert_eq!(config.debounce_ms, 20);
        assert_eq!(config.poll_interval_ms, 2000);
        assert!(config.okx.ws_url.contains("okx.com"));
    }
}
