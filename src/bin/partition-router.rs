// Copyright (c) 2025 - Cowboy AI, Inc.
//! Partition Router Service
//!
//! Consumes raw device telemetry and republishes each record to one of N
//! shard subjects.
//!
//! - device.data → JetStream → partition-router → ingest.queue.<1..N>
//!
//! Run with: cargo run --bin partition-router
//!
//! Prerequisites:
//! 1. NATS server with JetStream running (default: localhost:4222)
//! 2. MONITORING_REPLICAS set to the number of shard consumers (default: 3)

use anyhow::{Context, Result};
use std::sync::Arc;
use sync_infrastructure::{
    config::RouterConfig,
    jetstream::{ensure_pull_consumer, ensure_stream, ConsumerConfig, JetStreamConfig},
    listener::run_listener,
    router::{PartitionRouter, RedeliveryPolicy, TelemetryHandler},
    NatsClient, NatsConfig,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("🚀 Starting Partition Router");

    let config = RouterConfig::from_env().context("Invalid router configuration")?;
    let nats_config =
        NatsConfig::from_env("partition-router").context("Invalid NATS configuration")?;
    info!("📋 Configuration loaded:");
    info!("  - Strategy: {:?} ({})", config.strategy, config.placement);
    info!("  - Shards: {}", config.total_shards);
    info!("  - Ingest: {} → {}*", config.device_data_subject, config.ingest_prefix);
    info!("  - Dead letters: {}", config.dead_letter_subject);

    let client = NatsClient::new(nats_config)
        .await
        .context("Failed to connect to NATS")?;
    let jetstream = client.jetstream();

    let device_data = ensure_stream(
        jetstream,
        JetStreamConfig::device_data(&config.device_data_subject),
    )
    .await
    .context("Failed to set up telemetry stream")?;
    let ingest = ensure_stream(jetstream, JetStreamConfig::ingest(&config.ingest_prefix))
        .await
        .context("Failed to set up shard stream")?;
    ensure_stream(
        jetstream,
        JetStreamConfig::dead_letter(&config.dead_letter_subject),
    )
    .await
    .context("Failed to set up dead-letter stream")?;

    for shard in 1..=config.total_shards.get() {
        ensure_pull_consumer(&ingest, ConsumerConfig::ingest_queue(&config.ingest_prefix, shard))
            .await
            .with_context(|| format!("Failed to set up shard consumer {shard}"))?;
    }

    let consumer = ensure_pull_consumer(
        &device_data,
        ConsumerConfig::partition_router(&config.device_data_subject),
    )
    .await
    .context("Failed to set up router consumer")?;

    let sink = Arc::new(client.clone());
    let router = PartitionRouter::from_config(&config, sink.clone());
    info!("🔧 Partitioner ready: {}", router.strategy());
    let handler = Arc::new(TelemetryHandler::new(
        router,
        sink,
        config.dead_letter_subject.clone(),
        RedeliveryPolicy::from_config(&config),
    ));

    info!("🎧 Routing telemetry...");
    let stats = run_listener(consumer, handler)
        .await
        .context("Router listener failed")?;
    info!(
        routed = stats.acked,
        retried = stats.retried,
        dead_lettered = stats.rejected,
        "Router stopped"
    );

    client.flush().await.context("Failed to flush NATS client")?;
    Ok(())
}
