// Copyright (c) 2025 - Cowboy AI, Inc.
//! Identity projection consumer
//!
//! One consumer type serves every downstream service. A
//! [`ProjectionProfile`] names the domain it listens to and the fields its
//! replica keeps.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::SyncService;
use crate::errors::{SyncError, SyncResult};
use crate::events::{fields, Decoded, DomainEvent};
use crate::listener::{Delivery, DeliveryHandler, Disposition};
use crate::subjects::Domain;

use super::pure::{project_event, replay_projection, ProjectionOutcome, ReplicaAction};
use super::store::ReplicaStore;
use super::ProjectionAdapter;

/// Attempts at a load-project-save cycle before a conflict is returned
const MAX_CAS_ATTEMPTS: usize = 5;

/// Which events a replica follows and which fields it keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionProfile {
    pub name: &'static str,
    pub domain: Domain,
    pub fields: &'static [&'static str],
}

impl ProjectionProfile {
    /// Users as the authorization service sees them
    pub const AUTHORIZATION_USERS: Self = Self {
        name: "authorization",
        domain: Domain::User,
        fields: &[fields::USERNAME, fields::ROLE],
    };

    /// Users as device owners
    pub const DEVICE_USERS: Self = Self {
        name: "device",
        domain: Domain::User,
        fields: &[fields::USERNAME],
    };

    /// Devices with their consumption limits
    pub const MONITORING_DEVICES: Self = Self {
        name: "monitoring",
        domain: Domain::Device,
        fields: &[fields::MAX_CONSUMPTION],
    };

    pub fn for_service(service: SyncService) -> Self {
        match service {
            SyncService::Authorization => Self::AUTHORIZATION_USERS,
            SyncService::Device => Self::DEVICE_USERS,
            SyncService::Monitoring => Self::MONITORING_DEVICES,
        }
    }

    /// Key-value bucket holding this replica
    pub fn bucket(&self) -> String {
        format!("{}_{}_replica", self.name, self.domain)
    }
}

/// Result of applying one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Projected(ProjectionOutcome),
    /// Event is not for this replica
    Ignored(&'static str),
}

/// Cascade run when a replica row is about to be removed
///
/// The row stays until the hook succeeds, so a failed hook is retried on
/// redelivery. A hook may therefore run more than once for one removal.
#[async_trait]
pub trait ReplicaHook: Send + Sync {
    async fn on_remove(&self, subject_id: i64) -> SyncResult<()>;
}

/// Keeps one replica in step with an owning domain's events
pub struct IdentityProjectionConsumer<S: ReplicaStore> {
    profile: ProjectionProfile,
    store: Arc<S>,
    hook: Option<Arc<dyn ReplicaHook>>,
}

impl<S: ReplicaStore> IdentityProjectionConsumer<S> {
    pub fn new(profile: ProjectionProfile, store: Arc<S>) -> Self {
        Self {
            profile,
            store,
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn ReplicaHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn profile(&self) -> &ProjectionProfile {
        &self.profile
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Apply one event to the replica
    ///
    /// Concurrent writers to the same row are resolved by re-reading and
    /// re-projecting on a revision conflict.
    pub async fn apply(&self, event: &DomainEvent) -> SyncResult<ApplyOutcome> {
        if event.domain() != self.profile.domain {
            return Ok(ApplyOutcome::Ignored("event for another domain"));
        }

        let subject_id = event.subject_id();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self.store.load(subject_id).await?;
            let projection = project_event(
                current.as_ref().map(|row| &row.value),
                event,
                self.profile.fields,
            );

            let written = match projection.action {
                ReplicaAction::Put(row) => self
                    .store
                    .save(&row, current.as_ref().map(|row| row.revision))
                    .await
                    .map(|_| ()),
                ReplicaAction::Remove => self.remove(subject_id).await,
                ReplicaAction::Keep => Ok(()),
            };

            match written {
                Ok(()) => {
                    self.log_outcome(event, projection.outcome);
                    return Ok(ApplyOutcome::Projected(projection.outcome));
                }
                Err(SyncError::RevisionConflict { key }) if attempt < MAX_CAS_ATTEMPTS => {
                    debug!(replica = self.profile.name, key = %key, attempt, "Row changed concurrently, re-projecting");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn remove(&self, subject_id: i64) -> SyncResult<()> {
        if let Some(hook) = &self.hook {
            hook.on_remove(subject_id).await?;
        }
        self.store.remove(subject_id).await.map(|_| ())
    }

    /// Replace the replica with the result of replaying `events` in order
    pub async fn rebuild(&self, events: &[DomainEvent]) -> SyncResult<usize> {
        let relevant = events
            .iter()
            .filter(|event| event.domain() == self.profile.domain);
        let view = replay_projection(relevant, self.profile.fields);

        self.store.clear().await?;
        for row in view.values() {
            self.store.save(row, None).await?;
        }

        info!(replica = self.profile.name, rows = view.len(), "Replica rebuilt");
        Ok(view.len())
    }

    fn log_outcome(&self, event: &DomainEvent, outcome: ProjectionOutcome) {
        let subject_id = event.subject_id();
        let replica = self.profile.name;
        match outcome {
            ProjectionOutcome::Created => info!(replica, subject_id, "Replica row created"),
            ProjectionOutcome::Updated => info!(replica, subject_id, "Replica row updated"),
            ProjectionOutcome::SelfHealed => {
                warn!(replica, subject_id, "Update for unknown subject, row synthesized")
            }
            ProjectionOutcome::Merged => {
                info!(replica, subject_id, "Duplicate create filled missing fields")
            }
            ProjectionOutcome::Unchanged => debug!(replica, subject_id, kind = %event.kind(), "Row already current"),
            ProjectionOutcome::Deleted => info!(replica, subject_id, "Replica row removed"),
            ProjectionOutcome::AlreadyAbsent => {
                debug!(replica, subject_id, "Delete for unknown subject, nothing to do")
            }
        }
    }
}

#[async_trait]
impl<S: ReplicaStore + 'static> ProjectionAdapter for IdentityProjectionConsumer<S> {
    fn name(&self) -> &str {
        self.profile.name
    }

    async fn project(&self, event: &DomainEvent) -> SyncResult<ApplyOutcome> {
        self.apply(event).await
    }
}

/// Decode, project and decide the acknowledgement for one delivery
///
/// Ignored bodies are acknowledged, malformed ones rejected, and failed
/// store writes retried after `retry_backoff`. Nothing here stops the loop.
pub async fn handle_delivery<P>(
    adapter: &P,
    delivery: Delivery<'_>,
    retry_backoff: Duration,
) -> Disposition
where
    P: ProjectionAdapter + ?Sized,
{
    let event = match DomainEvent::decode(delivery.payload, Some(delivery.subject)) {
        Ok(Decoded::Event(event)) => event,
        Ok(Decoded::Ignored(reason)) => {
            debug!(consumer = adapter.name(), subject = delivery.subject, reason, "Ignoring sync message");
            return Disposition::Ack;
        }
        Err(e) => {
            error!(consumer = adapter.name(), subject = delivery.subject, error = %e, "Dropping malformed sync message");
            return Disposition::Reject;
        }
    };

    match adapter.project(&event).await {
        Ok(ApplyOutcome::Ignored(reason)) => {
            debug!(consumer = adapter.name(), subject_id = event.subject_id(), reason, "Event skipped");
            Disposition::Ack
        }
        Ok(ApplyOutcome::Projected(_)) => Disposition::Ack,
        Err(e) if e.is_transient() => {
            warn!(
                consumer = adapter.name(),
                subject_id = event.subject_id(),
                attempt = delivery.attempt,
                error = %e,
                "Projection failed, will retry"
            );
            Disposition::Retry {
                delay: retry_backoff,
            }
        }
        Err(e) => {
            error!(
                consumer = adapter.name(),
                subject_id = event.subject_id(),
                kind = %event.kind(),
                error = %e,
                "Projection failed permanently, dropping event"
            );
            Disposition::Reject
        }
    }
}

/// Listener handler for any projection adapter
pub struct SyncEventHandler<P: ?Sized> {
    adapter: Arc<P>,
    retry_backoff: Duration,
}

impl<P: ProjectionAdapter + ?Sized> SyncEventHandler<P> {
    pub fn new(adapter: Arc<P>, retry_backoff: Duration) -> Self {
        Self {
            adapter,
            retry_backoff,
        }
    }
}

#[async_trait]
impl<P: ProjectionAdapter + ?Sized + 'static> DeliveryHandler for SyncEventHandler<P> {
    fn name(&self) -> &str {
        self.adapter.name()
    }

    async fn handle(&self, delivery: Delivery<'_>) -> Disposition {
        handle_delivery(self.adapter.as_ref(), delivery, self.retry_backoff).await
    }
}
