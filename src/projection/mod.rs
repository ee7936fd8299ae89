// Copyright (c) 2025 - Cowboy AI, Inc.

//! Identity Projections
//!
//! A projection keeps a downstream service's replica of another service's
//! identity data in step with the owning domain's events.
//!
//! ```text
//! {domain}.sync ──> decode ──> project_event ──> ReplicaStore
//!                     │             │
//!                  ignored /     (row, event) → action
//!                  malformed        pure
//! ```
//!
//! Replicas are eventually consistent. Delivery is at least once and may be
//! out of order, so every step is idempotent and order tolerant:
//!
//! - re-applying an event leaves the row as it was
//! - an update for an unseen subject creates the row
//! - a delete for an unseen subject is a no-op
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use sync_infrastructure::events::DomainEvent;
//! use sync_infrastructure::projection::{
//!     IdentityProjectionConsumer, InMemoryReplicaStore, ProjectionProfile,
//! };
//!
//! # tokio_test::block_on(async {
//! let consumer = IdentityProjectionConsumer::new(
//!     ProjectionProfile::AUTHORIZATION_USERS,
//!     Arc::new(InMemoryReplicaStore::new()),
//! );
//! consumer.apply(&DomainEvent::user_updated(42, Some("ana"), None, Some("admin"))).await.unwrap();
//! assert_eq!(consumer.store().len(), 1);
//! # });
//! ```

pub mod consumer;
pub mod kv;
pub mod pure;
pub mod snapshot;
pub mod store;

use async_trait::async_trait;

use crate::errors::SyncResult;
use crate::events::DomainEvent;

pub use consumer::{
    handle_delivery, ApplyOutcome, IdentityProjectionConsumer, ProjectionProfile, ReplicaHook,
    SyncEventHandler,
};
pub use kv::KvReplicaStore;
pub use pure::{
    fold_projection, project_event, replay_projection, Projection, ProjectionOutcome,
    ReplicaAction, ReplicaView,
};
pub use snapshot::IdentitySnapshot;
pub use store::{InMemoryReplicaStore, ReplicaStore, Revision, Versioned};

/// Something that turns identity events into local state
///
/// Implementations must be idempotent: projecting the same event twice
/// leaves the same state as projecting it once.
#[async_trait]
pub trait ProjectionAdapter: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn project(&self, event: &DomainEvent) -> SyncResult<ApplyOutcome>;
}
