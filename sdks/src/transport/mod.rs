// Copyright (c) 2026 Alinea Team
// SPDX-License-Identifier: AGPL-3.0

//! Transport Layer
//!
//! The seam between [`AlineaClient`](crate::AlineaClient) and whatever carries
//! its requests to a backend.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Isolate the typed client from the wire
//! - **Pattern:** Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **HttpTransport** - reqwest session with bearer auth and connection pooling
//! - **MockTransport** - in-memory fake backend for tests and demos
//!
//! A transport only moves bytes. Status mapping, timeouts, decoding and
//! logging stay in the client so every implementation behaves the same.

pub mod http;
pub mod mock;

pub use http::HttpTransport;
pub use mock::MockTransport;

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// One outgoing call. `path` is relative to the configured base URL and
/// already percent-encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// Raw response: status and body bytes, nothing interpreted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Carries requests to a backend.
///
/// Implementations must be safe to call from many concurrently suspended
/// operations, and must not keep per-call state beyond the returned future:
/// dropping that future cancels the request.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and return the raw response. Only failures to obtain a
    /// response are errors; non-2xx statuses are returned as responses.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;

    /// Release pooled resources. Later calls may open a fresh session.
    async fn close(&self) {}
}
