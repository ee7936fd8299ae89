// Copyright (c) 2025 - Cowboy AI, Inc.
//! Sticky batched round-robin
//!
//! Consecutive device ids are dealt to shards in batches. A device keeps its
//! first shard for as long as the assignment store remembers it, which for
//! [`InMemoryAssignments`] is the life of the process.

use dashmap::DashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::debug;

use super::Partitioner;

/// Remembered device to shard assignments
pub trait AssignmentStore: Send + Sync {
    fn get(&self, device_id: i64) -> Option<u32>;

    /// Store `shard` unless an assignment exists; returns the winning shard
    fn insert_if_absent(&self, device_id: i64, shard: u32) -> u32;

    /// Overwrite an assignment
    fn replace(&self, device_id: i64, shard: u32);
}

/// Process-local assignments
#[derive(Debug, Default)]
pub struct InMemoryAssignments {
    shards: DashMap<i64, u32>,
}

impl InMemoryAssignments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}

impl AssignmentStore for InMemoryAssignments {
    fn get(&self, device_id: i64) -> Option<u32> {
        self.shards.get(&device_id).map(|shard| *shard)
    }

    fn insert_if_absent(&self, device_id: i64, shard: u32) -> u32 {
        *self.shards.entry(device_id).or_insert(shard)
    }

    fn replace(&self, device_id: i64, shard: u32) {
        self.shards.insert(device_id, shard);
    }
}

/// Batched round-robin with remembered assignments
pub struct StickyRoundRobin {
    batch_size: NonZeroU32,
    assignments: Arc<dyn AssignmentStore>,
}

impl StickyRoundRobin {
    pub fn new(batch_size: NonZeroU32) -> Self {
        Self::with_store(batch_size, Arc::new(InMemoryAssignments::new()))
    }

    pub fn with_store(batch_size: NonZeroU32, assignments: Arc<dyn AssignmentStore>) -> Self {
        Self {
            batch_size,
            assignments,
        }
    }

    pub fn batch_size(&self) -> NonZeroU32 {
        self.batch_size
    }

    /// Shard for a device seen for the first time
    pub fn initial_shard(&self, device_id: i64, total_shards: NonZeroU32) -> u32 {
        let batch = i128::from(self.batch_size.get());
        let total = i128::from(total_shards.get());
        ((i128::from(device_id) - 1).div_euclid(batch).rem_euclid(total) + 1) as u32
    }
}

impl Partitioner for StickyRoundRobin {
    fn name(&self) -> &str {
        "round-robin"
    }

    fn select_shard(&self, device_id: i64, total_shards: NonZeroU32) -> u32 {
        let in_range = |shard: u32| (1..=total_shards.get()).contains(&shard);

        match self.assignments.get(device_id) {
            Some(shard) if in_range(shard) => shard,
            Some(stale) => {
                let shard = self.initial_shard(device_id, total_shards);
                debug!(device_id, stale, shard, "Assignment outside shard range, reassigned");
                self.assignments.replace(device_id, shard);
                shard
            }
            None => {
                let shard = self.initial_shard(device_id, total_shards);
                let winner = self.assignments.insert_if_absent(device_id, shard);
                if in_range(winner) {
                    winner
                } else {
                    shard
                }
            }
        }
    }
}
