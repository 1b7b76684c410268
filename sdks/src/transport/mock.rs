// Copyright (c) 2026 Alinea Team
// SPDX-License-Identifier: AGPL-3.0

//! In-Memory Backend
//!
//! A fake Alinea backend that answers every endpoint the client calls from
//! process-local state. Intentions always execute successfully unless one of
//! their resources is locked by another agent.
//!
//! # Usage
//!
//! ```ignore
//! let backend = Arc::new(MockTransport::new().with_latency(Duration::from_millis(100)));
//! let client = AlineaClient::with_transport(config, backend.clone());
//! backend.fail_next(401, json!({"detail": "expired key"}));
//! ```

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use parking_lot::Mutex;
use percent_encoding::percent_decode_str;
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::{ApiRequest, ApiResponse, Method, Transport};
use crate::error::Result;

const DEFAULT_PATTERN_CONFIDENCE: f64 = 0.7;
const HIGH_CONFIDENCE: f64 = 0.8;
const SURPRISE_PENALTY: f64 = 0.1;
const MAX_TRACE_DEPTH: usize = 10;

type HandlerResult = std::result::Result<Value, (u16, Value)>;

#[derive(Debug, Clone)]
struct ExecutedAction {
    intention_id: String,
    agent_id: String,
    action: String,
    resources: Vec<String>,
    timestamp: String,
}

#[derive(Default)]
struct BackendState {
    intentions: HashMap<String, Value>,
    history: Vec<ExecutedAction>,
    agents: BTreeSet<String>,
    locks: HashMap<String, String>,
    resources: HashMap<String, Value>,
    patterns: HashMap<String, Value>,
    surprise_events: u64,
    hlc_logical: u64,
    injected: VecDeque<(u16, Value)>,
    requests: Vec<(Method, String)>,
}

/// Fake backend transport. Cheap to share behind an `Arc`.
#[derive(Default)]
pub struct MockTransport {
    latency: Option<Duration>,
    state: Mutex<BackendState>,
    in_flight: Arc<AtomicUsize>,
}

/// Decrements the in-flight counter however the request future ends.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        InFlight(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated network delay applied to every request before it is handled.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Answer the next request with `status` and `body` instead of handling it.
    pub fn fail_next(&self, status: u16, body: Value) {
        self.state.lock().injected.push_back((status, body));
    }

    /// Seed the value returned for `resource` by world-state reads.
    pub fn set_resource(&self, resource: impl Into<String>, value: Value) {
        self.state.lock().resources.insert(resource.into(), value);
    }

    /// Requests handled so far, in arrival order.
    pub fn requests(&self) -> Vec<(Method, String)> {
        self.state.lock().requests.clone()
    }

    /// Requests currently awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn lock_holder(&self, resource: &str) -> Option<String> {
        self.state.lock().locks.get(resource).cloned()
    }

    fn handle(&self, request: &ApiRequest) -> (u16, Value) {
        let mut state = self.state.lock();
        state.requests.push((request.method, request.path.clone()));

        if let Some(injected) = state.injected.pop_front() {
            return injected;
        }

        let body = request.body.clone().unwrap_or(Value::Null);
        let result = match (request.method, request.path.as_str()) {
            (Method::Post, "/api/intend") => state.intend(&body),
            (Method::Post, "/api/act") => state.act(&body),
            (Method::Post, "/api/coordination/coordinate") => state.coordinate(&body),
            (Method::Post, "/api/causality/trace") => state.trace(&body),
            (Method::Post, "/api/causality/impact") => state.impact(&body),
            (Method::Post, "/api/causality/counterfactual") => counterfactual(&body),
            (Method::Get, "/world/state") => state.world_state(&request.query),
            (Method::Post, "/world/locks/acquire") => state.acquire_lock(&body),
            (Method::Delete, path) if path.starts_with("/world/locks/") => {
                let resource = decode_segment(&path["/world/locks/".len()..]);
                state.release_lock(&resource, query_value(&request.query, "agent_id"))
            }
            (Method::Get, path) if path.starts_with("/patterns/confidence/") => {
                let pattern_id = decode_segment(&path["/patterns/confidence/".len()..]);
                state.pattern_confidence(&pattern_id)
            }
            (Method::Get, "/adaptation/metrics") => state.adaptation_metrics(),
            (Method::Get, "/adaptation/migration") => Ok(migration_status()),
            (Method::Post, "/agents/register") => state.register(&body),
            (Method::Post, "/agents/unregister") => state.unregister(&body),
            (Method::Post, "/memory/patterns") => state.store_pattern(&body),
            (Method::Post, "/memory/patterns/search") => state.search_patterns(&body),
            (Method::Post, "/memory/surprises") => state.record_surprise(&body),
            _ => Err(error(404, "Not found")),
        };

        match result {
            Ok(value) => (200, value),
            Err(failure) => failure,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let _guard = InFlight::enter(&self.in_flight);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let (status, body) = self.handle(&request);
        Ok(ApiResponse::json(status, &body))
    }
}

// ============================================================================
// Endpoint handlers
// ============================================================================

impl BackendState {
    fn intend(&mut self, body: &Value) -> HandlerResult {
        let agent_id = required_str(body, "agent_id")?;
        let action = required_str(body, "action")?;
        let resources = required_strings(body, "affected_resources")?;
        let context = body
            .get("context")
            .filter(|c| c.is_object())
            .cloned()
            .ok_or_else(|| error(422, "field 'context' must be an object"))?;

        let intention_id = format!("int-{}", Uuid::new_v4());
        let intention = json!({
            "intention_id": intention_id,
            "agent_id": agent_id,
            "action": action,
            "affected_resources": resources,
            "context": context,
            "timestamp": now(),
            "confidence": DEFAULT_PATTERN_CONFIDENCE,
        });
        self.intentions.insert(intention_id, intention.clone());
        Ok(intention)
    }

    fn act(&mut self, body: &Value) -> HandlerResult {
        let intention_id = required_str(body, "intention_id")?;
        let intention = self
            .intentions
            .remove(&intention_id)
            .ok_or_else(|| error(404, &format!("Intention {} not found", intention_id)))?;

        let agent_id = intention["agent_id"].as_str().unwrap_or_default().to_string();
        let resources: Vec<String> = intention["affected_resources"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|r| r.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let blocked = resources.iter().find_map(|r| {
            self.locks
                .get(r)
                .filter(|holder| **holder != agent_id)
                .map(|holder| (r.clone(), holder.clone()))
        });
        if let Some((resource, holder)) = blocked {
            return Ok(json!({
                "intention_id": intention_id,
                "outcome": "failure",
                "error": format!("resource '{}' is locked by {}", resource, holder),
                "timestamp": now(),
            }));
        }

        let timestamp = now();
        self.hlc_logical += 1;
        for resource in &resources {
            self.resources.insert(
                resource.clone(),
                json!({"status": "active", "last_action": intention["action"], "last_updated": timestamp}),
            );
        }
        self.history.push(ExecutedAction {
            intention_id: intention_id.clone(),
            agent_id,
            action: intention["action"].as_str().unwrap_or_default().to_string(),
            resources: resources.clone(),
            timestamp: timestamp.clone(),
        });

        Ok(json!({
            "intention_id": intention_id,
            "outcome": "success",
            "result": {"affected_resources": resources},
            "execution_time_ms": 0,
            "timestamp": timestamp,
        }))
    }

    fn coordinate(&mut self, body: &Value) -> HandlerResult {
        let agent_id = required_str(body, "agent_id")?;
        let resources = required_strings(body, "resources")?;
        let timeout_ms = body.get("timeout_ms").and_then(Value::as_u64).unwrap_or(30_000);

        if let Some(resource) = resources.iter().find(|r| self.locked_by_other(r, &agent_id)) {
            return Err(error(409, &format!("resource '{}' is locked", resource)));
        }

        let expires_at = i64::try_from(timeout_ms)
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| error(422, &format!("timeout_ms {} is out of range", timeout_ms)))?;
        Ok(json!({
            "transaction_id": format!("txn-{}", Uuid::new_v4()),
            "granted_resources": resources,
            "status": "granted",
            "expires_at": expires_at.to_rfc3339(),
        }))
    }

    /// Executed actions leading up to `target_event`, oldest first. When the
    /// event names a recorded intention the chain stops there; otherwise the
    /// whole recent history is returned. Later steps carry more weight.
    fn trace(&self, body: &Value) -> HandlerResult {
        let target = required_str(body, "target_entity_id")?;
        let depth = body
            .get("max_depth")
            .and_then(Value::as_u64)
            .map_or(MAX_TRACE_DEPTH, |d| (d as usize).min(MAX_TRACE_DEPTH));
        let end = self
            .history
            .iter()
            .position(|a| a.intention_id == target)
            .map(|i| i + 1)
            .unwrap_or(self.history.len());
        let start = end.saturating_sub(depth);
        let chain = &self.history[start..end];

        let path: Vec<Value> = chain
            .iter()
            .enumerate()
            .map(|(i, a)| {
                json!({
                    "agent_id": a.agent_id,
                    "action": a.action,
                    "causal_strength": (i + 1) as f64 / chain.len() as f64,
                    "timestamp": a.timestamp,
                    "resource_changes": {"resources": a.resources},
                })
            })
            .collect();

        let confidence = if path.is_empty() { 0.0 } else { 0.85 };
        Ok(json!({
            "target_event": target,
            "path": path,
            "confidence": confidence,
        }))
    }

    fn impact(&self, body: &Value) -> HandlerResult {
        let source = required_str(body, "source_entity_id")?;
        let touched: BTreeSet<&str> = self
            .history
            .iter()
            .filter(|a| a.agent_id == source || a.intention_id == source)
            .flat_map(|a| a.resources.iter().map(String::as_str))
            .collect();

        // Every other agent that acted on something the source touched.
        let affected: BTreeSet<&str> = self
            .history
            .iter()
            .filter(|a| a.agent_id != source && a.resources.iter().any(|r| touched.contains(r.as_str())))
            .map(|a| a.agent_id.as_str())
            .collect();

        Ok(json!({
            "source_event": source,
            "affected_entities": affected,
            "magnitude": affected.len() as f64 / 10.0,
            "details": {"resources": touched},
        }))
    }

    fn world_state(&mut self, query: &[(String, String)]) -> HandlerResult {
        let hlc_time = match query_value(query, "hlc_time") {
            Some(t) => t.to_string(),
            None => {
                self.hlc_logical += 1;
                format!("{}.{}", Utc::now().timestamp_millis(), self.hlc_logical)
            }
        };

        let mut resources = Map::new();
        let mut locks = Map::new();
        for (_, name) in query.iter().filter(|(k, _)| k == "resources") {
            let value = self
                .resources
                .get(name)
                .cloned()
                .unwrap_or_else(|| json!({"status": "unknown"}));
            resources.insert(name.clone(), value);
            if let Some(holder) = self.locks.get(name) {
                locks.insert(name.clone(), json!(holder));
            }
        }

        Ok(json!({
            "hlc_time": hlc_time,
            "resources": resources,
            "active_agents": self.agents,
            "resource_locks": locks,
            "snapshot_id": Uuid::new_v4().to_string(),
            "creation_timestamp": now(),
        }))
    }

    fn acquire_lock(&mut self, body: &Value) -> HandlerResult {
        let resource = required_str(body, "resource")?;
        let agent_id = required_str(body, "agent_id")?;

        if self.locked_by_other(&resource, &agent_id) {
            return Err(error(409, &format!("resource '{}' is already locked", resource)));
        }
        self.locks.insert(resource.clone(), agent_id);
        Ok(json!({"resource": resource, "acquired": true}))
    }

    fn release_lock(&mut self, resource: &str, agent_id: Option<&str>) -> HandlerResult {
        let holder = self.locks.get(resource).cloned();
        match (holder, agent_id) {
            (None, _) => Err(error(404, &format!("resource '{}' is not locked", resource))),
            (Some(holder), Some(agent)) if holder != agent => Err(error(
                409,
                &format!("resource '{}' is locked by {}", resource, holder),
            )),
            _ => {
                self.locks.remove(resource);
                Ok(json!({"resource": resource, "released": true}))
            }
        }
    }

    fn pattern_confidence(&self, pattern_id: &str) -> HandlerResult {
        let confidence = self
            .patterns
            .get(pattern_id)
            .and_then(|p| p["confidence"].as_f64())
            .unwrap_or(DEFAULT_PATTERN_CONFIDENCE);
        Ok(json!({"pattern_id": pattern_id, "confidence": confidence}))
    }

    fn adaptation_metrics(&self) -> HandlerResult {
        let high = self
            .patterns
            .values()
            .filter(|p| p["confidence"].as_f64().unwrap_or(0.0) > HIGH_CONFIDENCE)
            .count();
        Ok(json!({
            "total_patterns": self.patterns.len(),
            "high_confidence_patterns": high,
            "learning_rate": 0.1,
            "surprise_events": self.surprise_events,
            "adaptation_score": 0.75,
            "last_updated": now(),
        }))
    }

    fn register(&mut self, body: &Value) -> HandlerResult {
        let agent_id = required_str(body, "agent_id")?;
        self.agents.insert(agent_id.clone());
        Ok(json!({"agent_id": agent_id, "acknowledged": true}))
    }

    fn unregister(&mut self, body: &Value) -> HandlerResult {
        let agent_id = required_str(body, "agent_id")?;
        let known = self.agents.remove(&agent_id);
        self.locks.retain(|_, holder| *holder != agent_id);
        let message = if known { "unregistered" } else { "agent was not registered" };
        Ok(json!({
            "agent_id": agent_id,
            "acknowledged": known,
            "message": message,
        }))
    }

    fn store_pattern(&mut self, body: &Value) -> HandlerResult {
        let pattern_id = required_str(body, "pattern_id")?;
        let pattern_type = required_str(body, "pattern_type")?;
        let confidence = body
            .get("confidence")
            .and_then(Value::as_f64)
            .ok_or_else(|| error(422, "field 'confidence' must be a number"))?;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(error(422, "confidence must be within [0, 1]"));
        }

        let pattern = json!({
            "pattern_id": pattern_id,
            "pattern_type": pattern_type,
            "trigger_conditions": body.get("trigger_conditions").cloned().unwrap_or_else(|| json!({})),
            "expected_outcomes": body.get("expected_outcomes").cloned().unwrap_or_else(|| json!({})),
            "confidence": confidence,
            "usage_count": 0,
            "last_accessed": now(),
        });
        self.patterns.insert(pattern_id, pattern.clone());
        Ok(pattern)
    }

    /// Patterns whose trigger conditions are all satisfied by `context`,
    /// most confident first.
    fn search_patterns(&mut self, body: &Value) -> HandlerResult {
        let context = body
            .get("context")
            .and_then(Value::as_object)
            .ok_or_else(|| error(422, "field 'context' must be an object"))?;
        let pattern_type = body.get("pattern_type").and_then(Value::as_str);

        let mut matches: Vec<&mut Value> = self
            .patterns
            .values_mut()
            .filter(|p| pattern_type.map_or(true, |t| p["pattern_type"] == t))
            .filter(|p| {
                p["trigger_conditions"]
                    .as_object()
                    .map_or(true, |triggers| {
                        triggers.iter().all(|(k, v)| context.get(k) == Some(v))
                    })
            })
            .collect();

        let accessed = now();
        for pattern in matches.iter_mut() {
            let count = pattern["usage_count"].as_u64().unwrap_or(0);
            pattern["usage_count"] = json!(count + 1);
            pattern["last_accessed"] = json!(accessed);
        }

        let mut patterns: Vec<Value> = matches.into_iter().map(|p| p.clone()).collect();
        patterns.sort_by(|a, b| {
            let ca = a["confidence"].as_f64().unwrap_or(0.0);
            let cb = b["confidence"].as_f64().unwrap_or(0.0);
            cb.total_cmp(&ca)
        });
        Ok(json!({"patterns": patterns}))
    }

    fn record_surprise(&mut self, body: &Value) -> HandlerResult {
        let pattern_id = required_str(body, "pattern_id")?;
        self.surprise_events += 1;
        if let Some(pattern) = self.patterns.get_mut(&pattern_id) {
            let confidence = pattern["confidence"].as_f64().unwrap_or(DEFAULT_PATTERN_CONFIDENCE);
            pattern["confidence"] = json!((confidence - SURPRISE_PENALTY).max(0.0));
        }
        Ok(json!({"recorded": true}))
    }

    fn locked_by_other(&self, resource: &str, agent_id: &str) -> bool {
        self.locks.get(resource).is_some_and(|holder| holder != agent_id)
    }
}

fn counterfactual(body: &Value) -> HandlerResult {
    let event = required_str(body, "event_id")?;
    Ok(json!({
        "original_event": event,
        "counterfactual_scenario": format!("no_{}", event),
        "probability_difference": 0.23,
        "outcome_changes": {
            "system_stability": "+15%",
            "coordination_efficiency": "+8%",
            "resource_contention": "-30%",
        },
        "confidence": 0.75,
    }))
}

fn migration_status() -> Value {
    json!({
        "migration_id": "migration_001",
        "status": "completed",
        "progress": 1.0,
        "affected_agents": [],
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn error(status: u16, detail: &str) -> (u16, Value) {
    (status, json!({ "detail": detail }))
}

fn required_str(body: &Value, field: &str) -> std::result::Result<String, (u16, Value)> {
    body.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| error(422, &format!("field '{}' is required", field)))
}

fn required_strings(body: &Value, field: &str) -> std::result::Result<Vec<String>, (u16, Value)> {
    let items = body
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| error(422, &format!("field '{}' must be a list", field)))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| error(422, &format!("field '{}' must contain strings", field)))
        })
        .collect()
}

fn query_value<'a>(query: &'a [(String, String)], key: &str) -> Option<&'a str> {
    query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

fn decode_segment(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn call(backend: &MockTransport, request: ApiRequest) -> (u16, Value) {
        let response = backend.send(request).await.unwrap();
        let body = serde_json::from_slice(&response.body).unwrap();
        (response.status, body)
    }

    #[tokio::test]
    async fn test_intend_then_act() {
        let backend = MockTransport::new();
        let (status, intention) = call(
            &backend,
            ApiRequest::post(
                "/api/intend",
                json!({"agent_id": "a1", "action": "write", "affected_resources": ["db"], "context": {}}),
            ),
        )
        .await;
        assert_eq!(status, 200);
        let id = intention["intention_id"].as_str().unwrap().to_string();
        assert!(id.starts_with("int-"));

        let (status, result) = call(
            &backend,
            ApiRequest::post("/api/act", json!({"intention_id": id, "agent_id": "a1"})),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(result["outcome"], "success");

        // Intentions are consumed by act.
        let (status, _) = call(
            &backend,
            ApiRequest::post("/api/act", json!({"intention_id": id, "agent_id": "a1"})),
        )
        .await;
        assert_eq!(status, 404);
    }

    #[tokio::test]
    async fn test_act_fails_on_foreign_lock() {
        let backend = MockTransport::new();
        call(
            &backend,
            ApiRequest::post("/world/locks/acquire", json!({"resource": "db", "agent_id": "a2"})),
        )
        .await;
        let (_, intention) = call(
            &backend,
            ApiRequest::post(
                "/api/intend",
                json!({"agent_id": "a1", "action": "write", "affected_resources": ["db"], "context": {}}),
            ),
        )
        .await;
        let (_, result) = call(
            &backend,
            ApiRequest::post(
                "/api/act",
                json!({"intention_id": intention["intention_id"], "agent_id": "a1"}),
            ),
        )
        .await;
        assert_eq!(result["outcome"], "failure");
        assert!(result["error"].as_str().unwrap().contains("a2"));
    }

    #[tokio::test]
    async fn test_missing_fields_rejected() {
        let backend = MockTransport::new();
        let (status, body) = call(
            &backend,
            ApiRequest::post("/api/intend", json!({"agent_id": "a1"})),
        )
        .await;
        assert_eq!(status, 422);
        assert!(body["detail"].as_str().unwrap().contains("action"));
    }

    #[tokio::test]
    async fn test_fail_next_is_consumed_once() {
        let backend = MockTransport::new();
        backend.fail_next(503, json!({"detail": "maintenance"}));

        let (status, _) = call(&backend, ApiRequest::get("/adaptation/metrics")).await;
        assert_eq!(status, 503);
        let (status, _) = call(&backend, ApiRequest::get("/adaptation/metrics")).await;
        assert_eq!(status, 200);
        assert_eq!(backend.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let backend = MockTransport::new();
        let (status, _) = call(&backend, ApiRequest::get("/nope")).await;
        assert_eq!(status, 404);
    }

    #[tokio::test]
    async fn test_encoded_lock_segment() {
        let backend = MockTransport::new();
        call(
            &backend,
            ApiRequest::post(
                "/world/locks/acquire",
                json!({"resource": "db/primary", "agent_id": "a1"}),
            ),
        )
        .await;
        assert_eq!(backend.lock_holder("db/primary").as_deref(), Some("a1"));

        let (status, body) = call(&backend, ApiRequest::delete("/world/locks/db%2Fprimary")).await;
        assert_eq!(status, 200);
        assert_eq!(body["released"], true);
        assert!(backend.lock_holder("db/primary").is_none());
    }

    #[tokio::test]
    async fn test_search_requires_all_triggers() {
        let backend = MockTransport::new();
        for (id, triggers) in [
            ("p-db", json!({"resource": "db"})),
            ("p-db-peak", json!({"resource": "db", "load": "peak"})),
        ] {
            call(
                &backend,
                ApiRequest::post(
                    "/memory/patterns",
                    json!({"pattern_id": id, "pattern_type": "contention", "trigger_conditions": triggers, "confidence": 0.6}),
                ),
            )
            .await;
        }

        let (_, body) = call(
            &backend,
            ApiRequest::post("/memory/patterns/search", json!({"context": {"resource": "db"}})),
        )
        .await;
        let ids: Vec<&str> = body["patterns"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["pattern_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["p-db"]);
        assert_eq!(body["patterns"][0]["usage_count"], 1);
    }

    #[tokio::test]
    async fn test_coordinate_rejects_out_of_range_timeout() {
        let backend = MockTransport::new();
        for timeout_ms in [u64::MAX, i64::MAX as u64] {
            let (status, body) = call(
                &backend,
                ApiRequest::post(
                    "/api/coordination/coordinate",
                    json!({"agent_id": "a1", "resources": ["db"], "timeout_ms": timeout_ms}),
                ),
            )
            .await;
            assert_eq!(status, 422, "{timeout_ms}");
            assert!(body["detail"].as_str().unwrap().contains("timeout_ms"));
        }

        let (status, body) = call(
            &backend,
            ApiRequest::post(
                "/api/coordination/coordinate",
                json!({"agent_id": "a1", "resources": ["db"], "timeout_ms": 5000}),
            ),
        )
        .await;
        assert_eq!(status, 200);
        assert!(body["expires_at"].is_string());
    }

    #[tokio::test]
    async fn test_trace_honours_max_depth() {
        let backend = MockTransport::new();
        let mut last = String::new();
        for agent in ["a1", "a2", "a3"] {
            let (_, intention) = call(
                &backend,
                ApiRequest::post(
                    "/api/intend",
                    json!({"agent_id": agent, "action": "write", "affected_resources": ["db"], "context": {}}),
                ),
            )
            .await;
            last = intention["intention_id"].as_str().unwrap().to_string();
            call(
                &backend,
                ApiRequest::post("/api/act", json!({"intention_id": last, "agent_id": agent})),
            )
            .await;
        }

        let (status, body) = call(
            &backend,
            ApiRequest::post(
                "/api/causality/trace",
                json!({"target_entity_id": last, "max_depth": 2}),
            ),
        )
        .await;
        assert_eq!(status, 200);
        let agents: Vec<&str> = body["path"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["agent_id"].as_str().unwrap())
            .collect();
        assert_eq!(agents, vec!["a2", "a3"]);

        let (status, _) = call(
            &backend,
            ApiRequest::post("/api/causality/trace", json!({"event_id": last})),
        )
        .await;
        assert_eq!(status, 422);
    }
}
