// Copyright (c) 2025 - Cowboy AI, Inc.
//! Identity Projector Service
//!
//! Keeps one downstream service's identity replica in step with the owning
//! domains' sync events.
//!
//! - user.sync / device.sync → JetStream → durable consumer → projection → replica
//!
//! Run with: SYNC_SERVICE=authorization cargo run --bin identity-projector
//!
//! Prerequisites:
//! 1. NATS server with JetStream running (default: localhost:4222)
//! 2. SYNC_SERVICE set to authorization, device or monitoring

use anyhow::{Context, Result};
use async_nats::jetstream;
use futures::future::join_all;
use std::sync::Arc;
use sync_infrastructure::{
    config::{StoreBackend, SyncConfig, SyncService},
    credentials::{
        Argon2PasswordHasher, CredentialLifecycleConsumer, CredentialStore,
        InMemoryCredentialStore, KvCredentialStore,
    },
    jetstream::{ensure_pull_consumer, ensure_stream, open_bucket, ConsumerConfig, JetStreamConfig},
    listener::spawn_listener,
    projection::{
        IdentityProjectionConsumer, InMemoryReplicaStore, KvReplicaStore, ProjectionAdapter,
        ProjectionProfile, ReplicaStore, SyncEventHandler,
    },
    subjects::SubjectBuilder,
    NatsClient, NatsConfig,
};
use tracing::{error, info, warn};

const CREDENTIAL_BUCKET: &str = "authorization_credentials";
const USERNAME_BUCKET: &str = "authorization_usernames";

/// Wrap the replica consumer with credentials when the service keeps them
fn assemble<S, C>(
    replica: IdentityProjectionConsumer<S>,
    credentials: Option<Arc<C>>,
) -> Arc<dyn ProjectionAdapter>
where
    S: ReplicaStore + 'static,
    C: CredentialStore + 'static,
{
    match credentials {
        Some(credentials) => Arc::new(CredentialLifecycleConsumer::new(
            credentials,
            Arc::new(Argon2PasswordHasher),
            replica,
        )),
        None => Arc::new(replica),
    }
}

async fn build_adapter(
    config: &SyncConfig,
    jetstream: &jetstream::Context,
) -> Result<Arc<dyn ProjectionAdapter>> {
    let profile = ProjectionProfile::for_service(config.service);
    let keeps_credentials = config.service == SyncService::Authorization;

    let adapter = match config.store {
        StoreBackend::Kv => {
            let bucket = open_bucket(jetstream, &profile.bucket())
                .await
                .context("Failed to open replica bucket")?;
            let replica =
                IdentityProjectionConsumer::new(profile, Arc::new(KvReplicaStore::new(bucket)));

            let credentials = if keeps_credentials {
                let rows = open_bucket(jetstream, CREDENTIAL_BUCKET)
                    .await
                    .context("Failed to open credential bucket")?;
                let usernames = open_bucket(jetstream, USERNAME_BUCKET)
                    .await
                    .context("Failed to open username bucket")?;
                Some(Arc::new(KvCredentialStore::new(rows, usernames)))
            } else {
                None
            };
            assemble(replica, credentials)
        }
        StoreBackend::Memory => {
            warn!("Using in-memory stores, replica is lost on restart");
            let replica =
                IdentityProjectionConsumer::new(profile, Arc::new(InMemoryReplicaStore::new()));
            let credentials = keeps_credentials.then(|| Arc::new(InMemoryCredentialStore::new()));
            assemble(replica, credentials)
        }
    };
    Ok(adapter)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("🚀 Starting Identity Projector");

    let config = SyncConfig::from_env().context("Invalid sync configuration")?;
    let nats_config = NatsConfig::from_env(&format!("{}-identity-projector", config.service))
        .context("Invalid NATS configuration")?;
    info!("📋 Configuration loaded:");
    info!("  - Service: {}", config.service);
    info!("  - Stream: {}", config.stream);
    info!("  - Store: {:?}", config.store);
    info!("  - NATS servers: {:?}", nats_config.servers);

    let client = NatsClient::new(nats_config)
        .await
        .context("Failed to connect to NATS")?;
    let jetstream = client.jetstream();

    let stream = ensure_stream(jetstream, JetStreamConfig::sync_events(&config.stream))
        .await
        .context("Failed to set up sync stream")?;

    let adapter = build_adapter(&config, jetstream).await?;
    info!("🔧 Projection adapter ready: {}", adapter.name());

    let mut listeners = Vec::new();
    for domain in config.service.domains() {
        let consumer = ensure_pull_consumer(
            &stream,
            ConsumerConfig::new(
                config.consumer_name(*domain),
                SubjectBuilder::new().domain(*domain).build(),
            ),
        )
        .await
        .with_context(|| format!("Failed to set up consumer for {domain}"))?;

        let handler = Arc::new(SyncEventHandler::new(adapter.clone(), config.retry_backoff));
        listeners.push(spawn_listener(consumer, handler));
    }

    info!("🎧 Consuming {} sync subject(s)", listeners.len());

    for joined in join_all(listeners).await {
        match joined {
            Ok(Ok(stats)) => info!(
                acked = stats.acked,
                retried = stats.retried,
                rejected = stats.rejected,
                "Listener finished"
            ),
            Ok(Err(e)) => error!(error = %e, "Listener failed"),
            Err(e) => error!(error = %e, "Listener task panicked"),
        }
    }

    client.flush().await.context("Failed to flush NATS client")?;
    info!("👋 Identity Projector stopped");
    Ok(())
}
