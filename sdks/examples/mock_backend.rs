// Copyright (c) 2026 Alinea Team
// SPDX-License-Identifier: AGPL-3.0

//! Walk through a coordination session.
//!
//! Runs against the in-memory backend by default. Set `ALINEA_API_KEY` (and
//! optionally `ALINEA_BASE_URL`) to talk to a real deployment instead.
//!
//! ```text
//! RUST_LOG=debug cargo run -p alinea-sdk --example mock_backend
//! ```

use alinea_sdk::{AlineaClient, ClientConfig, Context, MockTransport, NewPattern};
use anyhow::{Context as _, Result};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging("info")?;

    let client = match std::env::var("ALINEA_API_KEY") {
        Ok(_) => AlineaClient::from_env().context("Failed to configure client from environment")?,
        Err(_) => {
            info!("ALINEA_API_KEY not set, using the in-memory backend");
            let config = ClientConfig::builder()
                .api_key("demo")
                .debug(true)
                .build()?;
            let backend = MockTransport::new().with_latency(Duration::from_millis(50));
            AlineaClient::with_transport(config, Arc::new(backend))
        }
    };

    client.register_agent("planner").await?;
    client.register_agent("indexer").await?;

    let mut context = Context::new();
    context.insert("batch".into(), json!(42));
    let intention = client
        .intend("indexer", "reindex", &["search".to_string()], context)
        .await?;
    info!(intention_id = %intention.intention_id, "Intention registered");

    let result = client.act(&intention).await?;
    info!(outcome = %result.outcome, "Intention executed");

    let path = client.trace_causality(&intention.intention_id).await?;
    info!(steps = path.path.len(), "Causal path traced");

    client
        .store_pattern(
            &NewPattern::new("reindex-nightly", "schedule")
                .trigger("action", json!("reindex"))
                .confidence(0.6),
        )
        .await?;

    let snapshot = client
        .get_world_state(&["search".to_string()], None)
        .await?;
    info!(hlc = %snapshot.hlc_time, resources = ?snapshot.resources, "World state");

    let health = client.get_system_health().await?;
    let metrics: Vec<_> = health.adaptation.numeric().collect();
    info!(healthy = health.is_healthy(), ?metrics, "System health");

    client.unregister_agent("indexer").await?;
    client.unregister_agent("planner").await?;
    client.close().await;
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}
