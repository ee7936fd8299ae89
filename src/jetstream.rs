// Copyright (c) 2025 - Cowboy AI, Inc.

//! JetStream streams, durable consumers and key-value buckets
//!
//! # Topology
//!
//! ```text
//! SYNC_EVENTS          user.sync, device.sync      <service>-<domain>-sync
//! DEVICE_DATA          device.data                 partition-router
//! INGEST               ingest.queue.*              ingest-queue-<n>
//! INGEST_DEAD_LETTER   ingest.dead_letter
//! ```
//!
//! Every setup call is idempotent: existing streams, consumers and buckets
//! are reused.
//!
//! # Example
//!
//! ```rust,no_run
//! use sync_infrastructure::jetstream::{ensure_stream, JetStreamConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = async_nats::connect("nats://localhost:4222").await?;
//!     let jetstream = async_nats::jetstream::new(client);
//!
//!     let stream = ensure_stream(&jetstream, JetStreamConfig::sync_events("SYNC_EVENTS")).await?;
//!
//!     Ok(())
//! }
//! ```

use async_nats::jetstream::{self, consumer::PullConsumer, kv, stream::Stream};
use std::time::Duration;
use tracing::info;

use crate::errors::{SyncError, SyncResult};
use crate::subjects::{Domain, SubjectBuilder, DEVICE_DATA_SUBJECT};

/// Stream settings
#[derive(Debug, Clone)]
pub struct JetStreamConfig {
    pub stream_name: String,

    /// Subjects this stream captures
    pub subjects: Vec<String>,

    /// Maximum age of messages (default: 7 days)
    pub max_age: Duration,

    /// Storage type (File or Memory)
    pub storage: StorageType,

    /// Number of replicas (for clustered NATS)
    pub replicas: usize,
}

impl Default for JetStreamConfig {
    fn default() -> Self {
        Self {
            stream_name: "SYNC_EVENTS".to_string(),
            subjects: Domain::ALL
                .iter()
                .map(|domain| SubjectBuilder::new().domain(*domain).build())
                .collect(),
            max_age: Duration::from_secs(7 * 24 * 60 * 60),
            storage: StorageType::File,
            replicas: 1,
        }
    }
}

impl JetStreamConfig {
    /// Identity events for every domain
    pub fn sync_events(stream_name: &str) -> Self {
        Self {
            stream_name: stream_name.to_string(),
            ..Self::default()
        }
    }

    /// Raw telemetry waiting to be routed
    pub fn device_data(subject: &str) -> Self {
        Self {
            stream_name: "DEVICE_DATA".to_string(),
            subjects: vec![subject.to_string()],
            max_age: Duration::from_secs(24 * 60 * 60),
            ..Self::default()
        }
    }

    /// Shard channels
    pub fn ingest(prefix: &str) -> Self {
        Self {
            stream_name: "INGEST".to_string(),
            subjects: vec![SubjectBuilder::shard_wildcard(prefix)],
            max_age: Duration::from_secs(24 * 60 * 60),
            ..Self::default()
        }
    }

    /// Telemetry given up on after repeated routing failures
    pub fn dead_letter(subject: &str) -> Self {
        Self {
            stream_name: "INGEST_DEAD_LETTER".to_string(),
            subjects: vec![subject.to_string()],
            max_age: Duration::from_secs(30 * 24 * 60 * 60),
            ..Self::default()
        }
    }
}

/// Storage type for JetStream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// File-based storage (persistent across restarts)
    File,
    /// Memory-based storage (faster, but lost on restart)
    Memory,
}

/// Create the stream, or return it if it already exists
pub async fn ensure_stream(
    jetstream: &jetstream::Context,
    config: JetStreamConfig,
) -> SyncResult<Stream> {
    let storage = match config.storage {
        StorageType::File => jetstream::stream::StorageType::File,
        StorageType::Memory => jetstream::stream::StorageType::Memory,
    };

    let stream_config = jetstream::stream::Config {
        name: config.stream_name.clone(),
        subjects: config.subjects,
        max_age: config.max_age,
        storage,
        num_replicas: config.replicas,
        ..Default::default()
    };

    let stream = jetstream
        .get_or_create_stream(stream_config)
        .await
        .map_err(|e| SyncError::BrokerUnavailable(e.to_string()))?;

    info!(stream = %config.stream_name, "Stream ready");
    Ok(stream)
}

/// Durable pull consumer settings
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Durable name (survives restarts)
    pub name: String,

    /// Only deliver messages on this subject
    pub filter_subject: String,

    /// Deliveries before the server stops redelivering (-1 for unlimited)
    pub max_deliver: i64,

    /// Time the server waits for an ack before redelivering
    pub ack_wait: Duration,

    /// Maximum number of pending acks
    pub max_ack_pending: i64,
}

impl ConsumerConfig {
    pub fn new(name: impl Into<String>, filter_subject: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filter_subject: filter_subject.into(),
            max_deliver: -1,
            ack_wait: Duration::from_secs(30),
            max_ack_pending: 1000,
        }
    }

    /// Consumer of the raw telemetry subject
    ///
    /// Redelivery is unbounded on the server. The router's
    /// `RedeliveryPolicy` decides when a record is dead-lettered, and a record
    /// whose dead-letter publish failed must still come back.
    pub fn partition_router(subject: &str) -> Self {
        Self::new("partition-router", subject)
    }

    /// Consumer a monitoring replica reads its shard from
    pub fn ingest_queue(prefix: &str, shard: u32) -> Self {
        Self::new(
            format!("ingest-queue-{shard}"),
            SubjectBuilder::shard(prefix, shard),
        )
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self::partition_router(DEVICE_DATA_SUBJECT)
    }
}

/// Create the durable consumer, or return it if it already exists
pub async fn ensure_pull_consumer(
    stream: &Stream,
    config: ConsumerConfig,
) -> SyncResult<PullConsumer> {
    let consumer = stream
        .get_or_create_consumer(
            &config.name,
            jetstream::consumer::pull::Config {
                durable_name: Some(config.name.clone()),
                filter_subject: config.filter_subject.clone(),
                ack_policy: jetstream::consumer::AckPolicy::Explicit,
                deliver_policy: jetstream::consumer::DeliverPolicy::All,
                max_deliver: config.max_deliver,
                ack_wait: config.ack_wait,
                max_ack_pending: config.max_ack_pending,
                ..Default::default()
            },
        )
        .await
        .map_err(|e| SyncError::BrokerUnavailable(e.to_string()))?;

    info!(
        consumer = %config.name,
        filter = %config.filter_subject,
        "Durable consumer ready"
    );
    Ok(consumer)
}

/// Open a key-value bucket, creating it on first use
pub async fn open_bucket(jetstream: &jetstream::Context, bucket: &str) -> SyncResult<kv::Store> {
    if let Ok(store) = jetstream.get_key_value(bucket).await {
        return Ok(store);
    }

    let store = jetstream
        .create_key_value(kv::Config {
            bucket: bucket.to_string(),
            history: 1,
            ..Default::default()
        })
        .await
        .map_err(|e| SyncError::Storage(format!("bucket {bucket}: {e}")))?;

    info!(bucket, "Created key-value bucket");
    Ok(store)
}
