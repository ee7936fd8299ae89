// Copyright (c) 2025 - Cowboy AI, Inc.
//! Hash-based shard placement
//!
//! The device id is hashed as its decimal string. Placement then maps the
//! unsigned 32-bit hash onto `1..=N`.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use super::Partitioner;

/// 32-bit hash of a routing key
pub trait KeyHasher: Send + Sync {
    /// `None` when the hash function cannot be used
    fn hash32(&self, key: &str) -> Option<u32>;
}

/// First four bytes of the MD5 digest, big-endian
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5KeyHasher;

impl KeyHasher for Md5KeyHasher {
    fn hash32(&self, key: &str) -> Option<u32> {
        let digest = md5::compute(key.as_bytes());
        let mut prefix = [0u8; 4];
        prefix.copy_from_slice(&digest.0[..4]);
        Some(u32::from_be_bytes(prefix))
    }
}

/// How a hash becomes a shard number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    /// `(hash mod N) + 1`
    #[default]
    Modulo,
    /// Jump consistent hash; growing N to N+1 moves about 1/(N+1) of devices
    Jump,
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::Modulo => write!(f, "modulo"),
            Placement::Jump => write!(f, "jump"),
        }
    }
}

impl FromStr for Placement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "modulo" => Ok(Placement::Modulo),
            "jump" => Ok(Placement::Jump),
            other => Err(format!("unknown hash placement: {other}")),
        }
    }
}

/// Lamping and Veach jump consistent hash, returning a bucket in `0..buckets`
pub fn jump_hash(key: u64, buckets: NonZeroU32) -> u32 {
    let buckets = i64::from(buckets.get());
    let mut key = key;
    let mut b: i64 = -1;
    let mut j: i64 = 0;
    while j < buckets {
        b = j;
        key = key.wrapping_mul(2862933555777941757).wrapping_add(1);
        j = ((b + 1) as f64 * ((1i64 << 31) as f64 / ((key >> 33) + 1) as f64)) as i64;
    }
    b as u32
}

/// Stateless hash partitioning
#[derive(Debug, Clone, Default)]
pub struct ConsistentHashing<H = Md5KeyHasher> {
    hasher: H,
    placement: Placement,
}

impl ConsistentHashing<Md5KeyHasher> {
    pub fn new(placement: Placement) -> Self {
        Self::with_hasher(Md5KeyHasher, placement)
    }
}

impl<H: KeyHasher> ConsistentHashing<H> {
    pub fn with_hasher(hasher: H, placement: Placement) -> Self {
        Self { hasher, placement }
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    fn place(&self, hash: u32, total_shards: NonZeroU32) -> u32 {
        match self.placement {
            Placement::Modulo => hash % total_shards.get() + 1,
            Placement::Jump => jump_hash(u64::from(hash), total_shards) + 1,
        }
    }
}

/// Placement used when no hash is available
pub(crate) fn fallback_shard(device_id: i64, total_shards: NonZeroU32) -> u32 {
    // rem_euclid keeps negative ids in range
    device_id.rem_euclid(i64::from(total_shards.get())) as u32 + 1
}

impl<H: KeyHasher> Partitioner for ConsistentHashing<H> {
    fn name(&self) -> &str {
        "consistent-hashing"
    }

    fn select_shard(&self, device_id: i64, total_shards: NonZeroU32) -> u32 {
        match self.hasher.hash32(&device_id.to_string()) {
            Some(hash) => self.place(hash, total_shards),
            None => {
                tracing::warn!(device_id, "Hash unavailable, using id modulo");
                fallback_shard(device_id, total_shards)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn shards(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    struct Unavailable;

    impl KeyHasher for Unavailable {
        fn hash32(&self, _key: &str) -> Option<u32> {
            None
        }
    }

    #[test]
    fn test_md5_prefix() {
        assert_eq!(Md5KeyHasher.hash32("7"), Some(0x8f14_e45f));
        assert_eq!(Md5KeyHasher.hash32("1"), Some(0xc4ca_4238));
    }

    #[test_case(1 => 2)]
    #[test_case(2 => 3)]
    #[test_case(3 => 1)]
    #[test_case(7 => 1)]
    #[test_case(42 => 2)]
    #[test_case(100 => 2)]
    fn test_modulo_three_shards(device_id: i64) -> u32 {
        ConsistentHashing::new(Placement::Modulo).select_shard(device_id, shards(3))
    }

    #[test_case(1 => 3)]
    #[test_case(2 => 2)]
    #[test_case(7 => 2)]
    #[test_case(100 => 3)]
    fn test_jump_three_shards(device_id: i64) -> u32 {
        ConsistentHashing::new(Placement::Jump).select_shard(device_id, shards(3))
    }

    #[test]
    fn test_single_shard() {
        for placement in [Placement::Modulo, Placement::Jump] {
            let partitioner = ConsistentHashing::new(placement);
            for device_id in [-5, 0, 1, i64::MAX] {
                assert_eq!(partitioner.select_shard(device_id, shards(1)), 1);
            }
        }
    }

    #[test]
    fn test_fallback_when_hash_unavailable() {
        let partitioner = ConsistentHashing::with_hasher(Unavailable, Placement::Modulo);
        assert_eq!(partitioner.select_shard(7, shards(3)), 2);
        assert_eq!(partitioner.select_shard(-1, shards(3)), 3);
    }

    #[test]
    fn test_placement_parse() {
        assert_eq!("JUMP".parse::<Placement>(), Ok(Placement::Jump));
        assert!("ring".parse::<Placement>().is_err());
        assert_eq!(Placement::default().to_string(), "modulo");
    }
}
