// Copyright (c) 2026 Alinea Team
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end coordination flows against the in-memory backend.
//!
//! These exercise the client contract that does not depend on HTTP:
//! timeouts and cancellation, concurrent fan-out, and multi-step workflows
//! (intend -> act -> trace, locks, pattern learning).

use alinea_sdk::{
    AlineaClient, AlineaError, ClientConfig, Context, MigrationState, MockTransport, NewPattern,
    Outcome, SurpriseReport,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn setup(backend: MockTransport, timeout: Duration) -> (AlineaClient, Arc<MockTransport>) {
    let backend = Arc::new(backend);
    let config = ClientConfig::builder()
        .api_key("k1")
        .timeout(timeout)
        .debug(true)
        .build()
        .unwrap();
    (AlineaClient::with_transport(config, backend.clone()), backend)
}

fn resources(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[tokio::test]
async fn test_intend_echoes_inputs() {
    let (client, _) = setup(MockTransport::new(), Duration::from_secs(5));
    let context: Context = serde_json::from_value(json!({"p": 1, "nested": {"k": [1, 2]}})).unwrap();

    let intention = client
        .intend("a1", "analyze", &resources(&["db", "cache"]), context.clone())
        .await
        .unwrap();

    assert!(!intention.intention_id.is_empty());
    assert_eq!(intention.agent_id, "a1");
    assert_eq!(intention.action, "analyze");
    assert_eq!(intention.affected_resources, resources(&["db", "cache"]));
    assert_eq!(intention.context, context);
}

#[tokio::test]
async fn test_intend_act_workflow() {
    let (client, backend) = setup(MockTransport::new(), Duration::from_secs(5));

    let intention = client
        .intend("a1", "write", &resources(&["db"]), Context::new())
        .await
        .unwrap();
    let result = client.act(&intention).await.unwrap();

    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(result.intention_id, intention.intention_id);
    assert!(result.error.is_none());

    let paths: Vec<String> = backend.requests().into_iter().map(|(_, p)| p).collect();
    assert_eq!(paths, vec!["/api/intend", "/api/act"]);
}

#[tokio::test]
async fn test_act_outcome_is_failure_when_resource_locked_elsewhere() {
    let (client, _) = setup(MockTransport::new(), Duration::from_secs(5));

    assert!(client
        .acquire_resource_lock("db", "a2", Duration::from_secs(30))
        .await
        .unwrap());

    let intention = client
        .intend("a1", "write", &resources(&["db"]), Context::new())
        .await
        .unwrap();
    let result = client.act(&intention).await.unwrap();

    assert_eq!(result.outcome, Outcome::Failure);
    assert!(result.error.unwrap().contains("a2"));
}

#[tokio::test]
async fn test_acting_twice_is_a_validation_error() {
    let (client, _) = setup(MockTransport::new(), Duration::from_secs(5));
    let intention = client
        .intend("a1", "write", &resources(&["db"]), Context::new())
        .await
        .unwrap();

    assert_ok!(client.act(&intention).await);
    let err = assert_err!(client.act(&intention).await);
    assert_eq!(err.status(), Some(404));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_connectivity_and_leaves_nothing_in_flight() {
    let (client, backend) = setup(
        MockTransport::new().with_latency(Duration::from_secs(10)),
        Duration::from_secs(1),
    );

    let err = client
        .intend("a1", "analyze", &resources(&["db"]), Context::new())
        .await
        .unwrap_err();

    assert!(err.is_timeout(), "{err:?}");
    assert!(matches!(err, AlineaError::Connectivity { .. }));
    assert_eq!(backend.in_flight(), 0);
    // The request was abandoned before the backend handled it.
    assert!(backend.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dropped_call_cancels_request() {
    let (client, backend) = setup(
        MockTransport::new().with_latency(Duration::from_secs(10)),
        Duration::from_secs(30),
    );

    let pending = client.register_agent("a1");
    let outcome = tokio::time::timeout(Duration::from_secs(2), pending).await;

    assert!(outcome.is_err());
    assert_eq!(backend.in_flight(), 0);
    assert!(backend.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_fan_out() {
    let (client, backend) = setup(
        MockTransport::new().with_latency(Duration::from_millis(100)),
        Duration::from_secs(1),
    );

    let agents: Vec<String> = (0..8).map(|i| format!("agent-{i}")).collect();
    let calls = agents.iter().map(|agent| {
        let client = client.clone();
        async move {
            let intention = client
                .intend(agent, "scan", &[format!("shard-{agent}")], Context::new())
                .await?;
            client.act(&intention).await
        }
    });

    let started = tokio::time::Instant::now();
    let results = futures::future::try_join_all(calls).await.unwrap();

    assert_eq!(results.len(), 8);
    assert!(results.iter().all(|r| r.outcome == Outcome::Success));
    // Two sequential round trips per agent, all agents in parallel.
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(backend.requests().len(), 16);
    assert_eq!(backend.in_flight(), 0);
}

#[tokio::test]
async fn test_injected_unauthorized_builds_no_entity() {
    let (client, backend) = setup(MockTransport::new(), Duration::from_secs(5));
    backend.fail_next(401, json!({"detail": "expired key"}));

    let result = client
        .intend("a1", "analyze", &resources(&["db"]), Context::new())
        .await;
    assert!(matches!(result, Err(AlineaError::Authentication { status: 401, .. })));

    // The backend never saw a well-formed intent, so nothing is pending.
    let snapshot = client.get_world_state(&resources(&["db"]), None).await.unwrap();
    assert_eq!(snapshot.resource("db"), Some(&json!({"status": "unknown"})));
}

#[tokio::test]
async fn test_causality_after_actions() {
    let (client, _) = setup(MockTransport::new(), Duration::from_secs(5));

    let mut last = None;
    for (agent, action, resource) in [
        ("a1", "migrate", "db"),
        ("a2", "restart", "db"),
        ("a3", "warm", "cache"),
    ] {
        let intention = client
            .intend(agent, action, &resources(&[resource]), Context::new())
            .await
            .unwrap();
        client.act(&intention).await.unwrap();
        last = Some(intention.intention_id);
    }

    let path = client.trace_causality(&last.unwrap()).await.unwrap();
    assert_eq!(path.path.len(), 3);
    assert_eq!(path.path[0].action, "migrate");
    assert!(path
        .path
        .iter()
        .all(|s| (0.0..=1.0).contains(&s.causal_strength)));
    assert_eq!(path.strongest().unwrap().agent_id, "a3");

    let impact = client.analyze_impact("a1").await.unwrap();
    assert!(impact.affected_entities.contains("a2"));
    assert!(!impact.affected_entities.contains("a3"));
    assert!(impact.magnitude >= 0.0);

    let counterfactual = client.counterfactual_analysis("a1", None).await.unwrap();
    assert_eq!(counterfactual.original_event, "a1");
    assert!(!counterfactual.outcome_changes.is_empty());
}

#[tokio::test]
async fn test_trace_with_no_history_is_empty() {
    let (client, _) = setup(MockTransport::new(), Duration::from_secs(5));
    let path = client.trace_causality("unknown-event").await.unwrap();
    assert!(path.is_empty());
}

#[tokio::test]
async fn test_world_state_reflects_agents_and_locks() {
    let (client, backend) = setup(MockTransport::new(), Duration::from_secs(5));
    backend.set_resource("config", json!({"version": 7}));

    client.register_agent("a1").await.unwrap();
    client.register_agent("a2").await.unwrap();
    assert!(client
        .acquire_resource_lock("config", "a1", Duration::from_secs(30))
        .await
        .unwrap());

    let snapshot = client
        .get_world_state(&resources(&["config", "db"]), None)
        .await
        .unwrap();
    assert_eq!(snapshot.resource("config"), Some(&json!({"version": 7})));
    assert_eq!(snapshot.lock_holder("config"), Some("a1"));
    assert_eq!(snapshot.active_agents, resources(&["a1", "a2"]));

    // Pinned reads echo the requested clock.
    let pinned = client
        .get_world_state(&resources(&["config"]), Some(&snapshot.hlc_time))
        .await
        .unwrap();
    assert_eq!(pinned.hlc_time, snapshot.hlc_time);
}

#[tokio::test]
async fn test_lock_lifecycle() {
    let (client, backend) = setup(MockTransport::new(), Duration::from_secs(5));
    let ttl = Duration::from_secs(30);

    assert!(client.acquire_resource_lock("db", "a1", ttl).await.unwrap());
    assert!(!client.acquire_resource_lock("db", "a2", ttl).await.unwrap());

    let handle = client.coordinate("a2", &resources(&["db"]), 1000).await;
    assert!(matches!(handle, Err(AlineaError::Validation { status: Some(409), .. })));

    // Only the holder may release.
    let err = client.release_resource_lock("db", "a2").await.unwrap_err();
    assert_eq!(err.status(), Some(409));

    assert!(client.release_resource_lock("db", "a1").await.unwrap());
    assert!(backend.lock_holder("db").is_none());
    // Already gone.
    assert!(client.release_resource_lock("db", "a1").await.unwrap());

    let handle = client.coordinate("a2", &resources(&["db"]), 1000).await.unwrap();
    assert!(handle.transaction_id.starts_with("txn-"));
    assert_eq!(handle.granted_resources, resources(&["db"]));
}

#[tokio::test]
async fn test_unregister_unknown_agent() {
    let (client, _) = setup(MockTransport::new(), Duration::from_secs(5));
    let ack = client.unregister_agent("ghost").await.unwrap();
    assert!(!ack.acknowledged);

    client.register_agent("a1").await.unwrap();
    let ack = client.unregister_agent("a1").await.unwrap();
    assert!(ack.acknowledged);
}

#[tokio::test]
async fn test_pattern_learning_loop() {
    let (client, _) = setup(MockTransport::new(), Duration::from_secs(5));

    let stored = client
        .store_pattern(
            &NewPattern::new("db-peak", "contention")
                .trigger("resource", json!("db"))
                .expected_outcome("wait_ms", json!(200))
                .confidence(0.9),
        )
        .await
        .unwrap();
    assert_eq!(stored.usage_count, 0);
    assert_eq!(client.get_pattern_confidence("db-peak").await.unwrap(), 0.9);

    let context: Context = serde_json::from_value(json!({"resource": "db", "hour": 3})).unwrap();
    let matches = client
        .find_matching_patterns(&context, Some("contention"))
        .await
        .unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].pattern_id, "db-peak");

    let none = client
        .find_matching_patterns(&context, Some("latency"))
        .await
        .unwrap();
    assert!(none.is_empty());

    client
        .record_surprise(&SurpriseReport {
            pattern_id: "db-peak".into(),
            expected_outcome: serde_json::from_value(json!({"wait_ms": 200})).unwrap(),
            actual_outcome: serde_json::from_value(json!({"wait_ms": 4000})).unwrap(),
            context,
        })
        .await
        .unwrap();

    let confidence = client.get_pattern_confidence("db-peak").await.unwrap();
    assert!((confidence - 0.8).abs() < 1e-9);

    let metrics = client.get_adaptation_metrics().await.unwrap();
    assert_eq!(metrics.get("total_patterns"), Some(1.0));
    assert_eq!(metrics.get("surprise_events"), Some(1.0));
}

#[tokio::test]
async fn test_unknown_pattern_has_default_confidence() {
    let (client, _) = setup(MockTransport::new(), Duration::from_secs(5));
    let confidence = client.get_pattern_confidence("never-seen").await.unwrap();
    assert!((0.0..=1.0).contains(&confidence));
}

#[tokio::test]
async fn test_system_health() {
    let (client, backend) = setup(MockTransport::new(), Duration::from_secs(5));
    let health = client.get_system_health().await.unwrap();

    assert!(health.is_healthy());
    assert_eq!(health.migration.status, MigrationState::Completed);
    assert!(health.adaptation.get("learning_rate").is_some());
    assert_eq!(backend.requests().len(), 2);
}

#[tokio::test]
async fn test_system_health_propagates_failure() {
    let (client, backend) = setup(MockTransport::new(), Duration::from_secs(5));
    backend.fail_next(500, json!({"detail": "metrics store down"}));

    let err = client.get_system_health().await.unwrap_err();
    assert!(err.is_retryable());
}
