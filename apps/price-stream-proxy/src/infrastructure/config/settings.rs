//! Proxy Configuration Settings
//!
//! Configuration types for the price stream proxy, loaded from environment
//! variables.

use std::time::Duration;

use crate::application::services::heartbeat::HeartbeatConfig;
use crate::application::services::reconnect::ReconnectConfig;
use crate::application::services::{AckMode, StreamSettings};

/// Default Twelve Data price stream endpoint.
pub const DEFAULT_UPSTREAM_URL: &str = "wss://ws.twelvedata.com/v1/quotes/price";

/// Twelve Data API key.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a key. Returns `None` for blank input.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into().trim().to_string();
        if key.is_empty() { None } else { Some(Self(key)) }
    }

    /// Get the raw key.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Upstream connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamSettings {
    /// WebSocket endpoint, without the `apikey` query parameter.
    pub url: String,
    /// API key; `None` leaves the proxy in inert mode.
    pub api_key: Option<ApiKey>,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_UPSTREAM_URL.to_string(),
            api_key: None,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// HTTP port.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { port: 3001 }
    }
}

/// Complete proxy configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    /// Upstream feed settings.
    pub upstream: UpstreamSettings,
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Session tuning.
    pub stream: StreamSettings,
}

impl ProxyConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `PORT` or `STREAM_ACK_MODE` is set to an
    /// unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// Unparsable tuning values fall back to their defaults; a missing API
    /// key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if `PORT` or `STREAM_ACK_MODE` is set to an
    /// unusable value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let upstream = UpstreamSettings {
            url: lookup("TWELVEDATA_WS_URL")
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty())
                .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string()),
            api_key: lookup("TWELVEDATA_API_KEY").and_then(ApiKey::new),
        };

        let port = match lookup("PORT") {
            Some(raw) if !raw.trim().is_empty() => {
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "PORT".to_string(),
                        value: raw.clone(),
                    })?
            }
            _ => ServerSettings::default().port,
        };

        let ack_mode = match lookup("STREAM_ACK_MODE") {
            Some(raw) if !raw.trim().is_empty() => {
                raw.parse::<AckMode>()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "STREAM_ACK_MODE".to_string(),
                        value: raw.clone(),
                    })?
            }
            _ => AckMode::default(),
        };

        let defaults = StreamSettings::default();
        let reconnect_defaults = ReconnectConfig::default();
        let initial_delay = parse_duration_millis(
            &lookup,
            "STREAM_RECONNECT_DELAY_MS",
            reconnect_defaults.initial_delay,
        );
        // Without an explicit cap the delay stays fixed at the configured value
        let max_delay =
            parse_duration_millis(&lookup, "STREAM_RECONNECT_DELAY_MAX_MS", initial_delay)
                .max(initial_delay);
        let stream = StreamSettings {
            heartbeat: HeartbeatConfig {
                interval: parse_duration_secs(
                    &lookup,
                    "STREAM_HEARTBEAT_INTERVAL_SECS",
                    defaults.heartbeat.interval,
                ),
            },
            reconnect: ReconnectConfig {
                initial_delay,
                max_delay,
                multiplier: parse_f64(
                    &lookup,
                    "STREAM_RECONNECT_MULTIPLIER",
                    reconnect_defaults.multiplier,
                ),
                jitter_factor: parse_f64(
                    &lookup,
                    "STREAM_RECONNECT_JITTER",
                    reconnect_defaults.jitter_factor,
                ),
            },
            connect_timeout: parse_duration_secs(
                &lookup,
                "STREAM_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout,
            ),
            ack_mode,
            resubscribe_on_reconnect: parse_bool(
                &lookup,
                "STREAM_RESUBSCRIBE_ON_RECONNECT",
                defaults.resubscribe_on_reconnect,
            ),
        };

        Ok(Self {
            upstream,
            server: ServerSettings { port },
            stream,
        })
    }

    /// Check whether an upstream API key is configured.
    #[must_use]
    pub const fn has_api_key(&self) -> bool {
        self.upstream.api_key.is_some()
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has a value that cannot be used.
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

fn parse_f64<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: f64) -> f64 {
    lookup(key)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(default)
}

fn parse_bool<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: bool) -> bool {
    lookup(key).map_or(default, |v| match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    })
}

fn parse_duration_secs<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
