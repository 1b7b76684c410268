// Copyright (c) 2026 Alinea Team
// SPDX-License-Identifier: AGPL-3.0

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::config::ClientConfig;
use crate::error::{AlineaError, Result};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport};
use crate::types::*;

/// Characters escaped when an identifier is placed in a URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Client for the Alinea coordination backend.
///
/// Cloning is cheap and clones share one transport session. The client keeps
/// no per-call state: every method is an independent request, and ordering
/// between calls is up to the caller.
#[derive(Clone)]
pub struct AlineaClient {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
}

impl AlineaClient {
    /// Create a client that talks HTTP to `config.base_url()`.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a client over any transport, e.g. [`MockTransport`](crate::transport::MockTransport).
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
        }
    }

    /// Create an HTTP client configured from `ALINEA_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Release the transport session. Requests already running keep their
    /// own handle and finish normally; later calls open a new session.
    pub async fn close(&self) {
        self.transport.close().await;
    }

    // ========================================================================
    // Coordination
    // ========================================================================

    /// Register an intention for `agent_id` to perform `action`.
    pub async fn intend(
        &self,
        agent_id: &str,
        action: &str,
        affected_resources: &[String],
        context: Context,
    ) -> Result<Intention> {
        const ENDPOINT: &str = "/api/intend";
        let body = IntendRequest {
            agent_id,
            action,
            affected_resources,
            context: &context,
        };

        let intention: Intention = self.post(ENDPOINT, &body).await?;
        intention
            .validate()
            .map_err(|e| AlineaError::deserialization(ENDPOINT, e))?;
        Ok(intention)
    }

    /// Execute a previously registered intention.
    pub async fn act(&self, intention: &Intention) -> Result<ActionResult> {
        const ENDPOINT: &str = "/api/act";
        if intention.intention_id.trim().is_empty() {
            return Err(AlineaError::invalid_argument(
                ENDPOINT,
                "intention has no intention_id",
            ));
        }

        let body = ActRequest {
            intention_id: &intention.intention_id,
            agent_id: &intention.agent_id,
        };
        self.post(ENDPOINT, &body).await
    }

    /// Ask the backend to coordinate exclusive access to `resources`.
    pub async fn coordinate(
        &self,
        agent_id: &str,
        resources: &[String],
        timeout_ms: u64,
    ) -> Result<TransactionHandle> {
        const ENDPOINT: &str = "/api/coordination/coordinate";
        let body = CoordinateRequest {
            agent_id,
            resources,
            timeout_ms,
        };

        let handle: TransactionHandle = self.post(ENDPOINT, &body).await?;
        handle
            .validate()
            .map_err(|e| AlineaError::deserialization(ENDPOINT, e))?;
        Ok(handle)
    }

    pub async fn register_agent(&self, agent_id: &str) -> Result<Acknowledgement> {
        self.post("/agents/register", &AgentRequest { agent_id }).await
    }

    pub async fn unregister_agent(&self, agent_id: &str) -> Result<Acknowledgement> {
        self.post("/agents/unregister", &AgentRequest { agent_id }).await
    }

    // ========================================================================
    // Causality & Temporal Debugging
    // ========================================================================

    /// Trace the causal chain that led to `event_id`. An empty path means the
    /// backend found no contributing actions.
    pub async fn trace_causality(&self, event_id: &str) -> Result<CausalPath> {
        const ENDPOINT: &str = "/api/causality/trace";
        let body = TraceRequest {
            target_entity_id: event_id,
            max_depth: CAUSAL_MAX_DEPTH,
            time_window_hours: CAUSAL_WINDOW_HOURS,
        };

        let path: CausalPath = self.post(ENDPOINT, &body).await?;
        path.validate()
            .map_err(|e| AlineaError::deserialization(ENDPOINT, e))?;
        Ok(path)
    }

    pub async fn analyze_impact(&self, event_id: &str) -> Result<ImpactAnalysis> {
        const ENDPOINT: &str = "/api/causality/impact";
        let body = ImpactRequest {
            source_entity_id: event_id,
            max_depth: CAUSAL_MAX_DEPTH,
            time_window_hours: CAUSAL_WINDOW_HOURS,
        };

        let impact: ImpactAnalysis = self.post(ENDPOINT, &body).await?;
        impact
            .validate()
            .map_err(|e| AlineaError::deserialization(ENDPOINT, e))?;
        Ok(impact)
    }

    /// What would have changed had `event_id` not happened (optionally as of `timestamp`).
    pub async fn counterfactual_analysis(
        &self,
        event_id: &str,
        timestamp: Option<&str>,
    ) -> Result<CounterfactualAnalysis> {
        let body = EventRequest {
            event_id,
            timestamp,
        };
        self.post("/api/causality/counterfactual", &body).await
    }

    // ========================================================================
    // Shared World State
    // ========================================================================

    /// Consistent snapshot of `resources`, at `hlc_time` if given or the
    /// backend's current clock otherwise.
    pub async fn get_world_state(
        &self,
        resources: &[String],
        hlc_time: Option<&HlcTimestamp>,
    ) -> Result<WorldSnapshot> {
        let mut request = ApiRequest::get("/world/state");
        for resource in resources {
            request = request.query("resources", resource.as_str());
        }
        if let Some(hlc) = hlc_time {
            request = request.query("hlc_time", hlc.as_str());
        }
        self.call(request).await
    }

    /// Acquire an exclusive lock. Returns `false` when another agent holds it.
    pub async fn acquire_resource_lock(
        &self,
        resource: &str,
        agent_id: &str,
        timeout: Duration,
    ) -> Result<bool> {
        let body = LockRequest {
            resource,
            agent_id,
            timeout_seconds: timeout.as_secs_f64(),
        };

        match self.post::<_, LockAcquired>("/world/locks/acquire", &body).await {
            Ok(lock) => Ok(lock.acquired),
            Err(AlineaError::Validation {
                status: Some(409), ..
            }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Release a lock held by `agent_id`. A lock that no longer exists counts
    /// as released.
    pub async fn release_resource_lock(&self, resource: &str, agent_id: &str) -> Result<bool> {
        let path = format!("/world/locks/{}", segment("/world/locks", resource)?);
        let request = ApiRequest::delete(path).query("agent_id", agent_id);

        match self.call::<LockReleased>(request).await {
            Ok(lock) => Ok(lock.released),
            Err(AlineaError::Validation {
                status: Some(404), ..
            }) => Ok(true),
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // Learning & Adaptation
    // ========================================================================

    /// Confidence in [0, 1] the backend has in a learned pattern.
    pub async fn get_pattern_confidence(&self, pattern_id: &str) -> Result<f64> {
        let path = format!(
            "/patterns/confidence/{}",
            segment("/patterns/confidence", pattern_id)?
        );
        let endpoint = path.clone();

        let confidence: PatternConfidence = self.call(ApiRequest::get(path)).await?;
        confidence
            .validate()
            .map_err(|e| AlineaError::deserialization(&endpoint, e))?;
        Ok(confidence.confidence)
    }

    pub async fn get_adaptation_metrics(&self) -> Result<AdaptationMetrics> {
        self.call(ApiRequest::get("/adaptation/metrics")).await
    }

    pub async fn get_migration_status(&self) -> Result<MigrationStatus> {
        self.call(ApiRequest::get("/adaptation/migration")).await
    }

    /// Adaptation metrics and migration status, fetched concurrently.
    pub async fn get_system_health(&self) -> Result<SystemHealth> {
        let (adaptation, migration) =
            tokio::try_join!(self.get_adaptation_metrics(), self.get_migration_status())?;
        Ok(SystemHealth {
            adaptation,
            migration,
        })
    }

    // ========================================================================
    // Memory
    // ========================================================================

    pub async fn store_pattern(&self, pattern: &NewPattern) -> Result<MemoryPattern> {
        if !(0.0..=1.0).contains(&pattern.confidence) {
            return Err(AlineaError::invalid_argument(
                "/memory/patterns",
                format!("confidence {} outside [0, 1]", pattern.confidence),
            ));
        }
        self.post("/memory/patterns", pattern).await
    }

    /// Patterns whose trigger conditions match `context`.
    pub async fn find_matching_patterns(
        &self,
        context: &Context,
        pattern_type: Option<&str>,
    ) -> Result<Vec<MemoryPattern>> {
        let body = PatternSearchRequest {
            context,
            pattern_type,
        };
        let response: PatternSearchResponse = self.post("/memory/patterns/search", &body).await?;
        Ok(response.patterns)
    }

    /// Report an outcome that diverged from what a pattern predicted.
    pub async fn record_surprise(&self, report: &SurpriseReport) -> Result<()> {
        let body = to_body("/memory/surprises", report)?;
        self.execute(ApiRequest::post("/memory/surprises", body))
            .await
            .map(|_| ())
    }

    // ========================================================================
    // Request plumbing
    // ========================================================================

    async fn post<B, T>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = to_body(endpoint, body)?;
        self.call(ApiRequest::post(endpoint, body)).await
    }

    async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let endpoint = request.path.clone();
        let response = self.execute(request).await?;
        serde_json::from_slice(&response.body)
            .map_err(|e| AlineaError::deserialization(&endpoint, e.to_string()))
    }

    /// Send one request under the configured timeout and turn non-2xx
    /// statuses into errors. If the timeout fires, the transport future is
    /// dropped, which cancels the request.
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let method = request.method;
        let endpoint = request.path.clone();
        let limit = self.config.timeout();

        debug!(%method, path = %endpoint, "Dispatching request");
        let started = Instant::now();
        let outcome = tokio::time::timeout(limit, self.transport.send(request)).await;
        let elapsed = started.elapsed();

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(%method, path = %endpoint, ?elapsed, error = %e, "Request failed");
                return Err(e);
            }
            Err(_) => {
                warn!(%method, path = %endpoint, ?elapsed, "Request timed out");
                return Err(AlineaError::timeout(&endpoint, limit));
            }
        };

        self.log_exchange(method, &endpoint, response.status, elapsed);

        if !response.is_success() {
            let text = String::from_utf8_lossy(&response.body);
            warn!(%method, path = %endpoint, status = response.status, "Backend returned error status");
            return Err(AlineaError::from_status(&endpoint, response.status, &text));
        }

        Ok(response)
    }

    fn log_exchange(&self, method: Method, endpoint: &str, status: u16, elapsed: Duration) {
        let duration_ms = elapsed.as_secs_f64() * 1000.0;
        if self.config.debug() {
            info!(%method, path = endpoint, status, duration_ms, "Request completed");
        } else {
            trace!(%method, path = endpoint, status, duration_ms, "Request completed");
        }
    }
}

fn to_body<B: Serialize + ?Sized>(endpoint: &str, body: &B) -> Result<serde_json::Value> {
    serde_json::to_value(body).map_err(|e| {
        AlineaError::invalid_argument(endpoint, format!("failed to serialize request: {}", e))
    })
}

fn segment(endpoint: &str, value: &str) -> Result<String> {
    if value.trim().is_empty() {
        return Err(AlineaError::invalid_argument(endpoint, "identifier is empty"));
    }
    // URL normalisation would drop these segments and retarget the request.
    if value == "." || value == ".." {
        return Err(AlineaError::invalid_argument(
            endpoint,
            format!("'{}' is not a valid identifier", value),
        ));
    }
    Ok(utf8_percent_encode(value, PATH_SEGMENT).to_string())
}
