// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Module
//!
//! - [`projection`] - idempotency and order tolerance of replica projection
//! - [`partitioning`] - shard coverage, determinism and rebalancing

mod partitioning;
mod projection;
