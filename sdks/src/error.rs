// Copyright (c) 2026 Alinea Team
// SPDX-License-Identifier: AGPL-3.0
//! Error
//!
//! Typed failures surfaced by every client operation.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Map configuration, HTTP and transport failures onto one taxonomy

use std::fmt;

pub type Result<T> = std::result::Result<T, AlineaError>;

/// Why a request never produced a usable response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityCause {
    /// The configured per-call timeout elapsed
    Timeout,
    /// Connection refused, DNS failure, TLS handshake failure
    Connect,
    /// The backend answered with a 5xx status
    Server(u16),
    /// Any other transport failure (reset, truncated body, ...)
    Transport,
}

impl fmt::Display for ConnectivityCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectivityCause::Timeout => write!(f, "timed out"),
            ConnectivityCause::Connect => write!(f, "connection failed"),
            ConnectivityCause::Server(status) => write!(f, "server error {}", status),
            ConnectivityCause::Transport => write!(f, "transport error"),
        }
    }
}

/// Errors returned by the Alinea client
#[derive(Debug, thiserror::Error)]
pub enum AlineaError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication failed for {endpoint} (HTTP {status}): {message}")]
    Authentication {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Request to {endpoint} rejected{}: {message}", fmt_status(.status))]
    Validation {
        endpoint: String,
        /// `None` when the request was rejected locally before being sent
        status: Option<u16>,
        message: String,
    },

    #[error("Request to {endpoint} failed ({cause}): {message}")]
    Connectivity {
        endpoint: String,
        cause: ConnectivityCause,
        message: String,
    },

    #[error("Invalid response from {endpoint}: {message}")]
    Deserialization { endpoint: String, message: String },
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl AlineaError {
    pub(crate) fn deserialization(endpoint: &str, message: impl Into<String>) -> Self {
        AlineaError::Deserialization {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_argument(endpoint: &str, message: impl Into<String>) -> Self {
        AlineaError::Validation {
            endpoint: endpoint.to_string(),
            status: None,
            message: message.into(),
        }
    }

    pub(crate) fn timeout(endpoint: &str, limit: std::time::Duration) -> Self {
        AlineaError::Connectivity {
            endpoint: endpoint.to_string(),
            cause: ConnectivityCause::Timeout,
            message: format!("no response within {:?}", limit),
        }
    }

    /// Build the error for a non-2xx response. `body` is the raw response text.
    pub(crate) fn from_status(endpoint: &str, status: u16, body: &str) -> Self {
        let message = backend_message(body);
        let endpoint = endpoint.to_string();
        match status {
            401 | 403 => AlineaError::Authentication {
                endpoint,
                status,
                message,
            },
            500..=599 => AlineaError::Connectivity {
                endpoint,
                cause: ConnectivityCause::Server(status),
                message,
            },
            _ => AlineaError::Validation {
                endpoint,
                status: Some(status),
                message,
            },
        }
    }

    /// HTTP status that produced this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            AlineaError::Authentication { status, .. } => Some(*status),
            AlineaError::Validation { status, .. } => *status,
            AlineaError::Connectivity {
                cause: ConnectivityCause::Server(status),
                ..
            } => Some(*status),
            _ => None,
        }
    }

    /// Endpoint path the failing request targeted.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            AlineaError::Configuration(_) => None,
            AlineaError::Authentication { endpoint, .. }
            | AlineaError::Validation { endpoint, .. }
            | AlineaError::Connectivity { endpoint, .. }
            | AlineaError::Deserialization { endpoint, .. } => Some(endpoint),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            AlineaError::Connectivity {
                cause: ConnectivityCause::Timeout,
                ..
            }
        )
    }

    /// Connectivity failures are the only ones a caller may sensibly retry.
    /// The client itself never does.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AlineaError::Connectivity { .. })
    }
}

/// Pull the human-readable message out of a backend error body.
///
/// FastAPI-style backends answer `{"detail": ...}`; others use `message` or
/// `error`. Falls back to the raw text.
fn backend_message(body: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["detail", "message", "error"] {
            match map.get(key) {
                Some(serde_json::Value::String(s)) => return s.clone(),
                Some(serde_json::Value::Null) | None => continue,
                Some(other) => return other.to_string(),
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no message".to_string()
    } else {
        trimmed.to_string()
    }
}
