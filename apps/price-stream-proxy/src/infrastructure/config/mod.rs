//! Configuration Module
//!
//! Configuration loading for the proxy service.

mod settings;

pub use settings::{
    ApiKey, ConfigError, DEFAULT_UPSTREAM_URL, ProxyConfig, ServerSettings, UpstreamSettings,
};
