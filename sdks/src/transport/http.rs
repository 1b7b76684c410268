// Copyright (c) 2026 Alinea Team
// SPDX-License-Identifier: AGPL-3.0

//! reqwest-backed transport.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{ApiRequest, ApiResponse, Method, Transport};
use crate::config::ClientConfig;
use crate::error::{AlineaError, ConnectivityCause, Result};

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// HTTP transport with a lazily created, pooled session.
///
/// The session is built on first use and shared by all calls until
/// [`close`](Transport::close). Each in-flight request holds its own handle to
/// the pool, so closing never cuts off a request that is already running.
pub struct HttpTransport {
    base_url: String,
    headers: HeaderMap,
    timeout: Duration,
    session: Mutex<Option<Client>>,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key()))
            .map_err(|_| {
                AlineaError::Configuration("API key contains invalid header characters".into())
            })?;
        auth.set_sensitive(true);

        let user_agent = HeaderValue::from_str(config.user_agent())
            .map_err(|_| AlineaError::Configuration("invalid user agent".into()))?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, user_agent);

        Ok(Self {
            base_url: config.base_url().to_string(),
            headers,
            timeout: config.timeout(),
            session: Mutex::new(None),
        })
    }

    /// Whether a session is currently open.
    pub fn is_connected(&self) -> bool {
        self.session.lock().is_some()
    }

    fn session(&self) -> Result<Client> {
        let mut guard = self.session.lock();
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        debug!(base_url = %self.base_url, "Opening HTTP session");
        let client = Client::builder()
            .default_headers(self.headers.clone())
            .timeout(self.timeout)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build()
            .map_err(|e| AlineaError::Configuration(format!("failed to create HTTP client: {}", e)))?;

        *guard = Some(client.clone());
        Ok(client)
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn map_transport_error(endpoint: &str, err: reqwest::Error) -> AlineaError {
    let cause = if err.is_timeout() {
        ConnectivityCause::Timeout
    } else if err.is_connect() {
        ConnectivityCause::Connect
    } else {
        ConnectivityCause::Transport
    };

    AlineaError::Connectivity {
        endpoint: endpoint.to_string(),
        cause,
        message: err.to_string(),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let session = self.session()?;
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = session.request(to_reqwest(request.method), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_transport_error(&request.path, e))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| map_transport_error(&request.path, e))?;

        Ok(ApiResponse { status, body })
    }

    async fn close(&self) {
        if self.session.lock().take().is_some() {
            debug!(base_url = %self.base_url, "Closed HTTP session");
        }
    }
}
