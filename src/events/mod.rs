// Copyright (c) 2025 - Cowboy AI, Inc.
//! Domain Events
//!
//! Identity events are immutable facts published by an owning service after
//! its local write commits ("user 42 was updated"). They carry only the
//! projection fields downstream replicas need, never the full source record.
//!
//! Telemetry records are transient measurements that exist only in flight
//! between the ingest channel and a shard channel.
//!
//! # Wire Shape
//!
//! ```text
//! { "eventType": "UPDATED", "subjectId": 42, "domain": "USER", "role": "ADMIN" }
//! { "timestamp": "2025-11-03T10:00:00", "device_id": 7, "measured_value": 0.42 }
//! ```
//!
//! # Module Organization
//!
//! - [`domain_event`] - identity events, wire decoding and encoding
//! - [`telemetry`] - device measurements and dead-letter envelopes

pub mod domain_event;
pub mod telemetry;

pub use domain_event::{fields, Decoded, DomainEvent, EventKind};
pub use telemetry::{DeadLetter, DeviceTelemetryRecord};
