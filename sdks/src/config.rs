// Copyright (c) 2026 Alinea Team
// SPDX-License-Identifier: AGPL-3.0
//! Client Configuration
//!
//! Connection settings for [`AlineaClient`](crate::AlineaClient).
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Validate base URL, credential, timeout and debug settings
//!
//! Nothing here reads the process environment implicitly. Callers opt in with
//! [`ClientConfig::from_env`] or [`ClientConfigBuilder::env_defaults`].
//!
//! # Usage
//!
//! ```ignore
//! let config = ClientConfig::builder()
//!     .base_url("http://localhost:8000")
//!     .api_key("k1")
//!     .timeout(Duration::from_secs(10))
//!     .build()?;
//! ```

use std::fmt;
use std::time::Duration;

use crate::error::{AlineaError, Result};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const ENV_BASE_URL: &str = "ALINEA_BASE_URL";
pub const ENV_API_KEY: &str = "ALINEA_API_KEY";
pub const ENV_DEBUG: &str = "ALINEA_DEBUG";
pub const ENV_TIMEOUT_SECS: &str = "ALINEA_TIMEOUT_SECS";

fn default_user_agent() -> String {
    format!("alinea-sdk-rust/{}", env!("CARGO_PKG_VERSION"))
}

/// Validated client settings.
#[derive(Clone)]
pub struct ClientConfig {
    base_url: String,
    api_key: String,
    timeout: Duration,
    debug: bool,
    user_agent: String,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Build a configuration entirely from `ALINEA_*` environment variables.
    pub fn from_env() -> Result<Self> {
        ClientConfigBuilder::new().env_defaults().build()
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

// Keep the credential out of logs.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("debug", &self.debug)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

#[derive(Debug, Default, Clone)]
pub struct ClientConfigBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout: Option<Duration>,
    debug: Option<bool>,
    user_agent: Option<String>,
    env_error: Option<String>,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Fill every unset option from the process environment.
    pub fn env_defaults(self) -> Self {
        self.lookup_defaults(|name| std::env::var(name).ok())
    }

    /// Fill every unset option through `lookup`, keyed by the `ALINEA_*`
    /// variable names. Values set explicitly on the builder win.
    pub fn lookup_defaults<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.base_url.is_none() {
            self.base_url = lookup(ENV_BASE_URL);
        }
        if self.api_key.is_none() {
            self.api_key = lookup(ENV_API_KEY);
        }
        if self.debug.is_none() {
            if let Some(raw) = lookup(ENV_DEBUG) {
                self.debug = Some(parse_flag(&raw));
            }
        }
        if self.timeout.is_none() {
            if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
                match parse_timeout_secs(&raw) {
                    Ok(timeout) => self.timeout = Some(timeout),
                    Err(e) => self.env_error = Some(e),
                }
            }
        }
        self
    }

    pub fn build(self) -> Result<ClientConfig> {
        if let Some(e) = self.env_error {
            return Err(AlineaError::Configuration(e));
        }

        let base_url = normalize_base_url(
            self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
        )?;

        let api_key = match self.api_key {
            Some(key) if !key.trim().is_empty() => key,
            _ => {
                return Err(AlineaError::Configuration(format!(
                    "API key is required; pass it explicitly or set {}",
                    ENV_API_KEY
                )))
            }
        };

        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(AlineaError::Configuration(
                "timeout must be greater than zero".to_string(),
            ));
        }

        Ok(ClientConfig {
            base_url,
            api_key,
            timeout,
            debug: self.debug.unwrap_or(false),
            user_agent: self.user_agent.unwrap_or_else(default_user_agent),
        })
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = url::Url::parse(trimmed)
        .map_err(|e| AlineaError::Configuration(format!("invalid base URL '{}': {}", raw, e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(AlineaError::Configuration(format!(
                "unsupported base URL scheme '{}', expected http or https",
                other
            )))
        }
    }
    if parsed.host_str().is_none() {
        return Err(AlineaError::Configuration(format!(
            "base URL '{}' has no host",
            raw
        )));
    }

    Ok(trimmed.to_string())
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_timeout_secs(raw: &str) -> std::result::Result<Duration, String> {
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("{} must be a number of seconds, got '{}'", ENV_TIMEOUT_SECS, raw))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("{} must be positive, got '{}'", ENV_TIMEOUT_SECS, raw));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|_| format!("{} is out of range, got '{}'", ENV_TIMEOUT_SECS, raw))
}
