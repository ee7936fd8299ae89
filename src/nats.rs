// Copyright (c) 2025 - Cowboy AI, Inc.
//! Broker connection shared by the projector and the router
//!
//! Publishing goes through JetStream so a send only succeeds once a stream
//! has stored the message.

use async_nats::jetstream;
use async_nats::{Client, ConnectOptions};
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::{SyncError, SyncResult};
use crate::publisher::MessageSink;

/// Where and how to reach the broker
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// Seed servers, tried in order
    pub servers: Vec<String>,
    /// Shown in the server's connection list
    pub name: String,
    pub connect_timeout: Duration,
    /// Bound on request/reply calls such as stream lookups
    pub request_timeout: Duration,
    /// Upper bound on a publish, including the stream acknowledgement
    pub publish_timeout: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            name: "sync-client".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            publish_timeout: Duration::from_secs(5),
        }
    }
}

/// NATS client wrapper with a JetStream context
#[derive(Clone)]
pub struct NatsClient {
    client: Client,
    jetstream: jetstream::Context,
    publish_timeout: Duration,
}

impl NatsClient {
    /// Connect to the first reachable server
    pub async fn new(config: NatsConfig) -> SyncResult<Self> {
        let connect_options = ConnectOptions::new()
            .name(&config.name)
            .connection_timeout(config.connect_timeout)
            .request_timeout(Some(config.request_timeout));

        let client = async_nats::connect_with_options(config.servers.join(","), connect_options)
            .await
            .map_err(|e| SyncError::BrokerUnavailable(e.to_string()))?;

        info!(servers = ?config.servers, client = %config.name, "Connected to NATS");

        let jetstream = jetstream::new(client.clone());
        Ok(Self {
            client,
            jetstream,
            publish_timeout: config.publish_timeout,
        })
    }

    /// JetStream context for stream, consumer and key-value operations
    pub fn jetstream(&self) -> &jetstream::Context {
        &self.jetstream
    }

    /// Flush buffered publishes before shutdown
    pub async fn flush(&self) -> SyncResult<()> {
        self.client
            .flush()
            .await
            .map_err(|e| SyncError::BrokerUnavailable(e.to_string()))
    }
}

#[async_trait::async_trait]
impl MessageSink for NatsClient {
    /// Publish to JetStream and wait for the stream to store the message
    async fn send(&self, subject: &str, payload: Bytes) -> SyncResult<()> {
        let publish = async {
            self.jetstream
                .publish(subject.to_string(), payload)
                .await
                .map_err(|e| SyncError::BrokerUnavailable(e.to_string()))?
                .await
                .map_err(|e| SyncError::BrokerUnavailable(e.to_string()))
        };

        let ack = tokio::time::timeout(self.publish_timeout, publish)
            .await
            .map_err(|_| {
                SyncError::BrokerUnavailable(format!(
                    "publish to {} not acknowledged within {:?}",
                    subject, self.publish_timeout
                ))
            })??;

        debug!(subject, stream = %ack.stream, sequence = ack.sequence, "Published message");
        Ok(())
    }
}
