// Copyright (c) 2025 - Cowboy AI, Inc.

//! Telemetry Partitioning
//!
//! Maps a device id onto one of N shard channels, numbered from 1.
//!
//! Two strategies, selected by `LB_STRATEGY`:
//!
//! - `consistent-hashing` ([`ConsistentHashing`]): stateless, identical across
//!   restarts and router instances. The default.
//! - `round-robin` ([`StickyRoundRobin`]): devices are dealt to shards in
//!   batches of `LB_DEVICES_PER_REPLICA` and keep their first shard for the
//!   life of the process. Only correct with a single router instance.

pub mod hashing;
pub mod sticky;

use std::num::NonZeroU32;
use std::sync::Arc;

use crate::config::{RouterConfig, StrategyKind};

pub use hashing::{jump_hash, ConsistentHashing, KeyHasher, Md5KeyHasher, Placement};
pub use sticky::{AssignmentStore, InMemoryAssignments, StickyRoundRobin};

/// Chooses the shard for a device
pub trait Partitioner: Send + Sync {
    /// Strategy name used in logs
    fn name(&self) -> &str;

    /// Shard for `device_id`, always in `1..=total_shards`
    fn select_shard(&self, device_id: i64, total_shards: NonZeroU32) -> u32;
}

impl<P: Partitioner + ?Sized> Partitioner for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn select_shard(&self, device_id: i64, total_shards: NonZeroU32) -> u32 {
        (**self).select_shard(device_id, total_shards)
    }
}

/// Strategy named by the router configuration
pub fn build_partitioner(config: &RouterConfig) -> Arc<dyn Partitioner> {
    match config.strategy {
        StrategyKind::ConsistentHashing => Arc::new(ConsistentHashing::new(config.placement)),
        StrategyKind::RoundRobin => Arc::new(StickyRoundRobin::new(config.devices_per_replica)),
    }
}
