//! Application configuration loaded from environment variables.

use std::time::Duration;

use crate::errors::{GatewayError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the exchange API (e.g. https://exchange.example.org/api)
    pub api_url: String,
    /// Port for the gateway's own HTTP API
    pub gateway_port: u16,
    /// Per-request timeout towards the exchange API
    pub request_timeout_secs: u64,
    /// Extra attempts for idempotent reads on transient failures
    pub read_retries: u32,
    /// First back-off between read retries; doubled each attempt
    pub retry_backoff_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` uses the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = lookup("API_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                GatewayError::Config("API_URL environment variable is required".to_string())
            })?;
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(GatewayError::Config(format!(
                "API_URL must be an http(s) URL, got {api_url}"
            )));
        }

        Ok(Config {
            api_url: api_url.trim_end_matches('/').to_string(),
            gateway_port: parse_or(&lookup, "GATEWAY_PORT", 3001)?,
            request_timeout_secs: parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 30)?,
            read_retries: parse_or(&lookup, "READ_RETRIES", 2)?,
            retry_backoff_ms: parse_or(&lookup, "RETRY_BACKOFF_MS", 250)?,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| GatewayError::Config(format!("Invalid {key}: {raw}"))),
    }
}
