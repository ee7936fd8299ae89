// Copyright (c) 2025 - Cowboy AI, Inc.
//! Identity replication and telemetry partitioning over NATS JetStream
//!
//! Services that own identity data (users, devices) publish a
//! [`DomainEvent`](events::DomainEvent) after each committed write. Every
//! downstream service runs a projection that keeps its own replica of the
//! fields it needs, tolerating duplicate and out-of-order delivery. The
//! authorization service additionally keeps hashed login credentials.
//!
//! Telemetry takes a separate path: raw measurements arrive on one ingest
//! subject and the [`PartitionRouter`](router::PartitionRouter) republishes
//! each one to a shard subject chosen by a [`Partitioner`](partition::Partitioner).
//!
//! ```text
//! owning service ──publish──> user.sync / device.sync ──> projection ──> replica
//! device ──> device.data ──> router ──> ingest.queue.<1..N>
//! ```

pub mod config;
pub mod credentials;
pub mod errors;
pub mod events;
pub mod jetstream;
pub mod listener;
pub mod nats;
pub mod partition;
pub mod projection;
pub mod publisher;
pub mod router;
pub mod state_machine;
pub mod subjects;

// Re-export commonly used types
pub use errors::{SyncError, SyncResult};
pub use events::{DeviceTelemetryRecord, DomainEvent, EventKind};
pub use nats::{NatsClient, NatsConfig};
pub use publisher::{EventPublisher, MessageSink};
pub use subjects::{Domain, SubjectBuilder};
