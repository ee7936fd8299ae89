// Copyright (c) 2025 - Cowboy AI, Inc.
//! Pull-consumer loops
//!
//! Each durable consumer runs in its own task. Handlers never see the NATS
//! message: they get a [`Delivery`] and answer with a [`Disposition`], and the
//! loop turns that into the JetStream acknowledgement. A failing message never
//! stops the loop.

use async_nats::jetstream::{self, consumer::PullConsumer};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::{SyncError, SyncResult};

/// One delivered message
#[derive(Debug, Clone, Copy)]
pub struct Delivery<'a> {
    pub subject: &'a str,
    pub payload: &'a [u8],
    /// 1 on first delivery
    pub attempt: u64,
}

/// What to tell the broker about a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed, or deliberately skipped
    Ack,
    /// Redeliver after `delay`
    Retry { delay: Duration },
    /// Never redeliver
    Reject,
}

/// Processes deliveries from one consumer
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn handle(&self, delivery: Delivery<'_>) -> Disposition;
}

/// Loop counters reported when the loop ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub acked: u64,
    pub retried: u64,
    pub rejected: u64,
    pub receive_errors: u64,
}

impl ListenerStats {
    fn record(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Ack => self.acked += 1,
            Disposition::Retry { .. } => self.retried += 1,
            Disposition::Reject => self.rejected += 1,
        }
    }

    fn total(&self) -> u64 {
        self.acked + self.retried + self.rejected + self.receive_errors
    }
}

/// Consume `consumer` until its message stream ends
pub async fn run_listener<H>(consumer: PullConsumer, handler: Arc<H>) -> SyncResult<ListenerStats>
where
    H: DeliveryHandler + ?Sized,
{
    let messages = consumer
        .stream()
        .max_messages_per_batch(10)
        .messages()
        .await
        .map_err(|e| SyncError::BrokerUnavailable(e.to_string()))?;
    tokio::pin!(messages);

    info!(handler = handler.name(), "Listening");
    let mut stats = ListenerStats::default();

    while let Some(message) = messages.next().await {
        let msg = match message {
            Ok(msg) => msg,
            Err(e) => {
                stats.receive_errors += 1;
                error!(handler = handler.name(), error = %e, "Error receiving message");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        let attempt = msg
            .info()
            .map(|info| info.delivered.max(1) as u64)
            .unwrap_or(1);
        let subject = msg.subject.to_string();
        debug!(handler = handler.name(), subject = %subject, attempt, "Received message");

        let disposition = handler
            .handle(Delivery {
                subject: &subject,
                payload: &msg.payload,
                attempt,
            })
            .await;
        stats.record(disposition);

        let acked = match disposition {
            Disposition::Ack => msg.ack().await,
            Disposition::Retry { delay } => {
                msg.ack_with(jetstream::AckKind::Nak(Some(delay))).await
            }
            Disposition::Reject => msg.ack_with(jetstream::AckKind::Term).await,
        };
        if let Err(e) = acked {
            warn!(
                handler = handler.name(),
                subject = %subject,
                ?disposition,
                error = %e,
                "Failed to acknowledge message"
            );
        }

        if stats.total() % 100 == 0 {
            info!(
                handler = handler.name(),
                acked = stats.acked,
                retried = stats.retried,
                rejected = stats.rejected,
                "Listener statistics"
            );
        }
    }

    warn!(handler = handler.name(), "Message stream ended");
    Ok(stats)
}

/// Run a listener on its own task
pub fn spawn_listener<H>(
    consumer: PullConsumer,
    handler: Arc<H>,
) -> JoinHandle<SyncResult<ListenerStats>>
where
    H: DeliveryHandler + ?Sized + 'static,
{
    tokio::spawn(run_listener(consumer, handler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_record_dispositions() {
        let mut stats = ListenerStats::default();
        stats.record(Disposition::Ack);
        stats.record(Disposition::Retry {
            delay: Duration::from_millis(10),
        });
        stats.record(Disposition::Reject);
        stats.record(Disposition::Ack);

        assert_eq!(stats.acked, 2);
        assert_eq!(stats.retried, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.total(), 4);
    }
}
