// Copyright (c) 2026 Alinea Team
// SPDX-License-Identifier: AGPL-3.0
//! Types
//!
//! Typed records exchanged with the Alinea coordination backend.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Strict JSON boundary for requests and responses
//!
//! Required fields are plain (non-`Option`) members so a payload missing them
//! is rejected at decode time. Aliases accept the field names older backend
//! builds still emit.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Free-form JSON object attached to intentions, patterns and surprises.
pub type Context = HashMap<String, Value>;

// ============================================================================
// Coordination
// ============================================================================

/// A caller-declared proposal to act on named resources, as accepted by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intention {
    pub intention_id: String,
    pub agent_id: String,
    pub action: String,
    #[serde(alias = "affects")]
    pub affected_resources: Vec<String>,
    pub context: Context,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, alias = "confidence_score", skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Intention {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.intention_id.trim().is_empty() {
            return Err("intention_id is empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn is_success(self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Failure => write!(f, "failure"),
        }
    }
}

/// Result of executing an intention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ActionResultWire")]
pub struct ActionResult {
    pub intention_id: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Context>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Backends report the outcome either as `"outcome": "success" | "failure"`
/// or as the older `"success": bool`. Exactly one is needed.
#[derive(Deserialize)]
struct ActionResultWire {
    intention_id: String,
    #[serde(default)]
    outcome: Option<Outcome>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    result: Option<Context>,
    #[serde(default, alias = "reason", alias = "message")]
    error: Option<String>,
    #[serde(default)]
    execution_time_ms: Option<f64>,
    #[serde(default)]
    timestamp: Option<String>,
}

impl TryFrom<ActionResultWire> for ActionResult {
    type Error = String;

    fn try_from(wire: ActionResultWire) -> Result<Self, Self::Error> {
        let outcome = match (wire.outcome, wire.success) {
            (Some(outcome), _) => outcome,
            (None, Some(true)) => Outcome::Success,
            (None, Some(false)) => Outcome::Failure,
            (None, None) => return Err("missing field `outcome`".to_string()),
        };

        Ok(ActionResult {
            intention_id: wire.intention_id,
            outcome,
            result: wire.result,
            error: wire.error,
            execution_time_ms: wire.execution_time_ms,
            timestamp: wire.timestamp,
        })
    }
}

/// Handle for a multi-resource coordination transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionHandle {
    #[serde(alias = "coordination_id")]
    pub transaction_id: String,
    #[serde(default)]
    pub granted_resources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl TransactionHandle {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.transaction_id.trim().is_empty() {
            return Err("transaction_id is empty".to_string());
        }
        Ok(())
    }
}

/// Backend acknowledgement of an agent (de)registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub agent_id: String,
    #[serde(alias = "success")]
    pub acknowledged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// Causality
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalStep {
    #[serde(alias = "entity_id")]
    pub agent_id: String,
    #[serde(alias = "event_type")]
    pub action: String,
    #[serde(alias = "significance")]
    pub causal_strength: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, alias = "properties")]
    pub resource_changes: Context,
}

/// Ordered chain of prior actions that contributed to `target_event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalPath {
    #[serde(alias = "target_entity_id")]
    pub target_event: String,
    #[serde(alias = "causal_chain", alias = "causal_path")]
    pub path: Vec<CausalStep>,
    #[serde(default, alias = "analysis_confidence", skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl CausalPath {
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    /// The step with the highest causal strength, if any.
    pub fn strongest(&self) -> Option<&CausalStep> {
        self.path
            .iter()
            .max_by(|a, b| a.causal_strength.total_cmp(&b.causal_strength))
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        for (i, step) in self.path.iter().enumerate() {
            if !(0.0..=1.0).contains(&step.causal_strength) {
                return Err(format!(
                    "path[{}].causal_strength {} outside [0, 1]",
                    i, step.causal_strength
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactAnalysis {
    pub source_event: String,
    #[serde(alias = "affected_agents")]
    pub affected_entities: BTreeSet<String>,
    #[serde(alias = "impact_score")]
    pub magnitude: f64,
    #[serde(default, alias = "impact_details", alias = "analysis")]
    pub details: Context,
}

impl ImpactAnalysis {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if !self.magnitude.is_finite() || self.magnitude < 0.0 {
            return Err(format!("magnitude {} is negative or not finite", self.magnitude));
        }
        Ok(())
    }
}

/// What-if analysis for an alternative timeline without `original_event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterfactualAnalysis {
    pub original_event: String,
    pub outcome_changes: Context,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterfactual_scenario: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability_difference: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

// ============================================================================
// World State
// ============================================================================

/// Hybrid Logical Clock value. Opaque: only the backend interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HlcTimestamp(pub String);

impl HlcTimestamp {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HlcTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HlcTimestamp {
    fn from(value: &str) -> Self {
        HlcTimestamp(value.to_string())
    }
}

impl From<String> for HlcTimestamp {
    fn from(value: String) -> Self {
        HlcTimestamp(value)
    }
}

/// Consistent view of the requested resources at one HLC time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub hlc_time: HlcTimestamp,
    pub resources: HashMap<String, Value>,
    #[serde(default)]
    pub active_agents: Vec<String>,
    /// resource -> agent holding the lock
    #[serde(default)]
    pub resource_locks: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<String>,
}

impl WorldSnapshot {
    pub fn resource(&self, name: &str) -> Option<&Value> {
        self.resources.get(name)
    }

    pub fn lock_holder(&self, resource: &str) -> Option<&str> {
        self.resource_locks.get(resource).map(String::as_str)
    }
}

// ============================================================================
// Learning & Adaptation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternConfidence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_id: Option<String>,
    #[serde(alias = "confidence_score")]
    pub confidence: f64,
}

impl PatternConfidence {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence {} outside [0, 1]", self.confidence));
        }
        Ok(())
    }
}

/// Metric name -> value, plus when the backend last recomputed them.
///
/// Values are kept as reported. Status flags and labels the backend mixes in
/// sit next to the numeric metrics; [`get`](Self::get) only sees numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(flatten)]
    pub metrics: BTreeMap<String, Value>,
}

impl AdaptationMetrics {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).and_then(Value::as_f64)
    }

    /// Numeric metrics only, by name.
    pub fn numeric(&self) -> impl Iterator<Item = (&str, f64)> {
        self.metrics
            .iter()
            .filter_map(|(name, value)| value.as_f64().map(|v| (name.as_str(), v)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationStatus {
    pub migration_id: String,
    pub status: MigrationState,
    pub progress: f64,
    #[serde(default)]
    pub affected_agents: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

/// Aggregated view returned by `get_system_health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub adaptation: AdaptationMetrics,
    pub migration: MigrationStatus,
}

impl SystemHealth {
    pub fn is_healthy(&self) -> bool {
        self.migration.status != MigrationState::Failed
    }
}

// ============================================================================
// Memory
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryPattern {
    pub pattern_id: String,
    pub pattern_type: String,
    #[serde(default)]
    pub trigger_conditions: Context,
    #[serde(default)]
    pub expected_outcomes: Context,
    pub confidence: f64,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default, alias = "created_at", skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<String>,
}

/// A pattern to be learned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPattern {
    pub pattern_id: String,
    pub pattern_type: String,
    pub trigger_conditions: Context,
    pub expected_outcomes: Context,
    pub confidence: f64,
}

impl NewPattern {
    pub fn new(pattern_id: impl Into<String>, pattern_type: impl Into<String>) -> Self {
        Self {
            pattern_id: pattern_id.into(),
            pattern_type: pattern_type.into(),
            trigger_conditions: Context::new(),
            expected_outcomes: Context::new(),
            confidence: 0.5,
        }
    }

    pub fn trigger(mut self, key: impl Into<String>, value: Value) -> Self {
        self.trigger_conditions.insert(key.into(), value);
        self
    }

    pub fn expected_outcome(mut self, key: impl Into<String>, value: Value) -> Self {
        self.expected_outcomes.insert(key.into(), value);
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}

/// Observed outcome that diverged from what a pattern predicted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurpriseReport {
    pub pattern_id: String,
    pub expected_outcome: Context,
    pub actual_outcome: Context,
    pub context: Context,
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Serialize)]
pub(crate) struct IntendRequest<'a> {
    pub agent_id: &'a str,
    pub action: &'a str,
    pub affected_resources: &'a [String],
    pub context: &'a Context,
}

#[derive(Serialize)]
pub(crate) struct ActRequest<'a> {
    pub intention_id: &'a str,
    pub agent_id: &'a str,
}

/// Causal chains are followed at most this many steps back.
pub(crate) const CAUSAL_MAX_DEPTH: u32 = 10;
/// History window searched by trace and impact queries.
pub(crate) const CAUSAL_WINDOW_HOURS: u32 = 24;

#[derive(Serialize)]
pub(crate) struct TraceRequest<'a> {
    pub target_entity_id: &'a str,
    pub max_depth: u32,
    pub time_window_hours: u32,
}

#[derive(Serialize)]
pub(crate) struct ImpactRequest<'a> {
    pub source_entity_id: &'a str,
    pub max_depth: u32,
    pub time_window_hours: u32,
}

#[derive(Serialize)]
pub(crate) struct EventRequest<'a> {
    pub event_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<&'a str>,
}

#[derive(Serialize)]
pub(crate) struct AgentRequest<'a> {
    pub agent_id: &'a str,
}

#[derive(Serialize)]
pub(crate) struct CoordinateRequest<'a> {
    pub agent_id: &'a str,
    pub resources: &'a [String],
    pub timeout_ms: u64,
}

#[derive(Serialize)]
pub(crate) struct LockRequest<'a> {
    pub resource: &'a str,
    pub agent_id: &'a str,
    pub timeout_seconds: f64,
}

#[derive(Deserialize)]
pub(crate) struct LockAcquired {
    pub acquired: bool,
}

#[derive(Deserialize)]
pub(crate) struct LockReleased {
    pub released: bool,
}

#[derive(Serialize)]
pub(crate) struct PatternSearchRequest<'a> {
    pub context: &'a Context,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_type: Option<&'a str>,
}

#[derive(Deserialize)]
pub(crate) struct PatternSearchResponse {
    pub patterns: Vec<MemoryPattern>,
}
