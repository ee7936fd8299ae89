// Copyright (c) 2025 - Cowboy AI, Inc.
//! Partition router
//!
//! Consumes raw telemetry from the ingest subject and republishes each record
//! to `<prefix><shard>`. A record that cannot be routed is never acknowledged
//! as if it had been: it is redelivered, and once the delivery limit is
//! reached it goes to the dead-letter subject before being rejected.

use async_trait::async_trait;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::RouterConfig;
use crate::errors::{SyncError, SyncResult};
use crate::events::{DeadLetter, DeviceTelemetryRecord};
use crate::listener::{Delivery, DeliveryHandler, Disposition};
use crate::partition::{build_partitioner, Partitioner};
use crate::publisher::MessageSink;
use crate::subjects::SubjectBuilder;

/// Republishes telemetry to shard subjects
pub struct PartitionRouter {
    partitioner: Arc<dyn Partitioner>,
    sink: Arc<dyn MessageSink>,
    total_shards: NonZeroU32,
    prefix: String,
}

impl PartitionRouter {
    pub fn new(
        partitioner: Arc<dyn Partitioner>,
        sink: Arc<dyn MessageSink>,
        total_shards: NonZeroU32,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            partitioner,
            sink,
            total_shards,
            prefix: prefix.into(),
        }
    }

    /// Router with the strategy, shard count and prefix from `config`
    pub fn from_config(config: &RouterConfig, sink: Arc<dyn MessageSink>) -> Self {
        Self::new(
            build_partitioner(config),
            sink,
            config.total_shards,
            config.ingest_prefix.clone(),
        )
    }

    pub fn total_shards(&self) -> NonZeroU32 {
        self.total_shards
    }

    /// Name of the partitioning strategy
    pub fn strategy(&self) -> &str {
        self.partitioner.name()
    }

    /// Publish `record` to its shard subject and return the shard
    pub async fn route(&self, record: &DeviceTelemetryRecord) -> SyncResult<u32> {
        let shard = self
            .partitioner
            .select_shard(record.device_id, self.total_shards);
        let subject = SubjectBuilder::shard(&self.prefix, shard);

        let payload = record.to_bytes()?;
        self.sink
            .send(&subject, payload)
            .await
            .map_err(|e| SyncError::Routing {
                subject: subject.clone(),
                cause: e.to_string(),
            })?;

        debug!(
            device_id = record.device_id,
            shard,
            subject = %subject,
            strategy = self.partitioner.name(),
            "Telemetry routed"
        );
        Ok(shard)
    }
}

/// When to stop redelivering a record
///
/// The server redelivers without limit; past `max_deliveries` every delivery
/// tries the dead-letter subject until that publish succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeliveryPolicy {
    /// Deliveries before the record is dead-lettered
    pub max_deliveries: u64,
    pub backoff: Duration,
}

impl RedeliveryPolicy {
    pub fn from_config(config: &RouterConfig) -> Self {
        Self {
            max_deliveries: config.max_deliveries.max(1) as u64,
            backoff: config.retry_backoff,
        }
    }

    pub fn exhausted(&self, attempt: u64) -> bool {
        attempt >= self.max_deliveries
    }
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self::from_config(&RouterConfig::default())
    }
}

/// Listener handler for the ingest consumer
pub struct TelemetryHandler {
    router: PartitionRouter,
    dead_letters: Arc<dyn MessageSink>,
    dead_letter_subject: String,
    policy: RedeliveryPolicy,
}

impl TelemetryHandler {
    pub fn new(
        router: PartitionRouter,
        dead_letters: Arc<dyn MessageSink>,
        dead_letter_subject: impl Into<String>,
        policy: RedeliveryPolicy,
    ) -> Self {
        Self {
            router,
            dead_letters,
            dead_letter_subject: dead_letter_subject.into(),
            policy,
        }
    }

    pub fn router(&self) -> &PartitionRouter {
        &self.router
    }

    /// Route one delivery and decide its acknowledgement
    pub async fn handle_delivery(&self, delivery: Delivery<'_>) -> Disposition {
        let record = match DeviceTelemetryRecord::decode(delivery.payload) {
            Ok(record) => record,
            Err(e) => {
                error!(subject = delivery.subject, error = %e, "Undecodable telemetry");
                return self.dead_letter(delivery, &e, None).await;
            }
        };

        match self.router.route(&record).await {
            Ok(_) => Disposition::Ack,
            Err(e) if self.policy.exhausted(delivery.attempt) => {
                error!(
                    device_id = record.device_id,
                    attempt = delivery.attempt,
                    error = %e,
                    "Routing failed on final delivery"
                );
                self.dead_letter(delivery, &e, Some(record.device_id)).await
            }
            Err(e) => {
                warn!(
                    device_id = record.device_id,
                    attempt = delivery.attempt,
                    error = %e,
                    "Routing failed, will retry"
                );
                Disposition::Retry {
                    delay: self.policy.backoff,
                }
            }
        }
    }

    async fn dead_letter(
        &self,
        delivery: Delivery<'_>,
        cause: &SyncError,
        device_id: Option<i64>,
    ) -> Disposition {
        let letter = DeadLetter::new(
            delivery.subject,
            delivery.payload,
            cause,
            delivery.attempt,
            device_id,
        );
        let sent = match letter.to_bytes() {
            Ok(payload) => {
                self.dead_letters
                    .send(&self.dead_letter_subject, payload)
                    .await
            }
            Err(e) => Err(e),
        };

        match sent {
            Ok(()) => {
                warn!(
                    subject = delivery.subject,
                    dead_letter_subject = %self.dead_letter_subject,
                    "Telemetry dead-lettered"
                );
                Disposition::Reject
            }
            Err(e) => {
                error!(error = %e, "Dead-letter publish failed, keeping message");
                Disposition::Retry {
                    delay: self.policy.backoff,
                }
            }
        }
    }
}

#[async_trait]
impl DeliveryHandler for TelemetryHandler {
    fn name(&self) -> &str {
        "partition-router"
    }

    async fn handle(&self, delivery: Delivery<'_>) -> Disposition {
        self.handle_delivery(delivery).await
    }
}
