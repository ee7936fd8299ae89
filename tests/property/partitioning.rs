// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Shard Selection

use proptest::prelude::*;
use std::num::NonZeroU32;

use sync_infrastructure::partition::{
    ConsistentHashing, Partitioner, Placement, StickyRoundRobin,
};

fn shard_count() -> impl Strategy<Value = NonZeroU32> {
    (1u32..=64).prop_map(|n| NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN))
}

fn placement() -> impl Strategy<Value = Placement> {
    prop_oneof![Just(Placement::Modulo), Just(Placement::Jump)]
}

/// Fraction of devices whose shard changes when growing from `n` to `n + 1`
fn moved_fraction(partitioner: &dyn Partitioner, n: u32, devices: i64) -> (f64, usize) {
    let before = NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN);
    let after = before.saturating_add(1);

    let mut moved = 0usize;
    let mut moved_elsewhere = 0usize;
    for device_id in 1..=devices {
        let old = partitioner.select_shard(device_id, before);
        let new = partitioner.select_shard(device_id, after);
        if old != new {
            moved += 1;
            if new != after.get() {
                moved_elsewhere += 1;
            }
        }
    }
    (moved as f64 / devices as f64, moved_elsewhere)
}

proptest! {
    /// Property: Every selection is a valid shard
    #[test]
    fn prop_hashing_covers_range(device_id in any::<i64>(), n in shard_count(), placement in placement()) {
        let shard = ConsistentHashing::new(placement).select_shard(device_id, n);
        prop_assert!((1..=n.get()).contains(&shard));
    }

    #[test]
    fn prop_sticky_covers_range(device_id in any::<i64>(), n in shard_count(), batch in shard_count()) {
        let shard = StickyRoundRobin::new(batch).select_shard(device_id, n);
        prop_assert!((1..=n.get()).contains(&shard));
    }

    /// Property: Hash placement survives a restart
    #[test]
    fn prop_hashing_is_deterministic(device_id in any::<i64>(), n in shard_count(), placement in placement()) {
        let before = ConsistentHashing::new(placement).select_shard(device_id, n);
        let after = ConsistentHashing::new(placement).select_shard(device_id, n);
        prop_assert_eq!(before, after);
    }

    /// Property: Devices in one batch share a shard
    #[test]
    fn prop_sticky_batches_share_shard(batch_index in 0i64..1000, batch in shard_count(), n in shard_count()) {
        let partitioner = StickyRoundRobin::new(batch);
        let first = batch_index * i64::from(batch.get()) + 1;
        let expected = partitioner.select_shard(first, n);
        for offset in 1..i64::from(batch.get()) {
            prop_assert_eq!(partitioner.select_shard(first + offset, n), expected);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: Growing N to N+1 moves about 1/(N+1) of devices, all to the new shard
    #[test]
    fn prop_jump_rebalancing_bound(n in 1u32..=32) {
        let partitioner = ConsistentHashing::new(Placement::Jump);
        let (moved, moved_elsewhere) = moved_fraction(&partitioner, n, 20_000);

        let bound = 1.0 / f64::from(n + 1) * 1.15 + 0.005;
        prop_assert!(moved <= bound, "n={} moved {:.4} > {:.4}", n, moved, bound);
        prop_assert_eq!(moved_elsewhere, 0);
    }
}
