// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event publisher for identity events
//!
//! Owning services call the publisher only after their local write has
//! committed. A broker failure never rolls the write back: the failure is
//! logged and the replicas stay stale until the next event for the subject
//! heals them.

use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::errors::{SyncError, SyncResult};
use crate::events::DomainEvent;

/// Anything that can accept a message for a subject
///
/// Implemented by [`crate::nats::NatsClient`] over JetStream; tests supply
/// in-memory sinks.
#[async_trait::async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, subject: &str, payload: Bytes) -> SyncResult<()>;
}

#[async_trait::async_trait]
impl<T: MessageSink + ?Sized> MessageSink for Arc<T> {
    async fn send(&self, subject: &str, payload: Bytes) -> SyncResult<()> {
        (**self).send(subject, payload).await
    }
}

/// Publishes identity events to their domain's sync subject
pub struct EventPublisher {
    sink: Arc<dyn MessageSink>,
    timeout: Duration,
}

impl EventPublisher {
    /// Create a publisher with the default timeout
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self {
            sink,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn builder() -> EventPublisherBuilder {
        EventPublisherBuilder::default()
    }

    /// Publish one event to `<domain>.sync`
    pub async fn publish(&self, event: &DomainEvent) -> SyncResult<()> {
        let subject = event.subject();
        let payload = event.to_bytes()?;

        debug!(
            subject = %subject,
            subject_id = event.subject_id(),
            kind = %event.kind(),
            "Publishing identity event"
        );

        match tokio::time::timeout(self.timeout, self.sink.send(&subject, payload)).await {
            Ok(Ok(())) => {}
            Ok(Err(SyncError::BrokerUnavailable(cause))) => {
                return Err(SyncError::BrokerUnavailable(cause))
            }
            Ok(Err(other)) => return Err(SyncError::BrokerUnavailable(other.to_string())),
            Err(_) => {
                return Err(SyncError::BrokerUnavailable(format!(
                    "publish to {} timed out after {:?}",
                    subject, self.timeout
                )))
            }
        }

        info!(
            subject = %subject,
            subject_id = event.subject_id(),
            kind = %event.kind(),
            "Identity event published"
        );
        Ok(())
    }

    /// Publish and swallow failures
    ///
    /// Returns whether the broker accepted the event.
    pub async fn publish_best_effort(&self, event: &DomainEvent) -> bool {
        match self.publish(event).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    subject_id = event.subject_id(),
                    domain = %event.domain(),
                    kind = %event.kind(),
                    error = %e,
                    "Failed to publish identity event, replicas stay stale until the next event"
                );
                false
            }
        }
    }

    /// Run the local write, then announce it
    ///
    /// Nothing is published when `commit` fails. A publish failure after a
    /// successful commit is logged and the commit result is returned as is.
    pub async fn commit_then_publish<T, E, F, M>(&self, commit: F, event_for: M) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        M: FnOnce(&T) -> DomainEvent,
    {
        let committed = commit.await?;
        let event = event_for(&committed);
        self.publish_best_effort(&event).await;
        Ok(committed)
    }
}

/// Builder for [`EventPublisher`]
#[derive(Default)]
pub struct EventPublisherBuilder {
    sink: Option<Arc<dyn MessageSink>>,
    timeout: Option<Duration>,
}

impl EventPublisherBuilder {
    pub fn sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Upper bound on a single publish
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> SyncResult<EventPublisher> {
        let sink = self
            .sink
            .ok_or_else(|| SyncError::Configuration("publisher requires a sink".to_string()))?;
        let mut publisher = EventPublisher::new(sink);
        if let Some(timeout) = self.timeout {
            publisher.timeout = timeout;
        }
        Ok(publisher)
    }
}
