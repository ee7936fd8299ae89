// Copyright (c) 2025 - Cowboy AI, Inc.
//! Environment configuration
//!
//! Every loader has a `from_env` entry point and a `from_lookup` variant that
//! takes the variable source as a function, so tests never touch the process
//! environment.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{SyncError, SyncResult};
use crate::nats::NatsConfig;
use crate::partition::Placement;
use crate::subjects::{Domain, DEAD_LETTER_SUBJECT, DEVICE_DATA_SUBJECT, INGEST_PREFIX};

/// Source of configuration values
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn string_or(lookup: Lookup<'_>, key: &str, default: &str) -> String {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_or<T>(lookup: Lookup<'_>, key: &str, default: T) -> SyncResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse()
            .map_err(|e| SyncError::Configuration(format!("{key}={raw}: {e}"))),
        None => Ok(default),
    }
}

fn non_zero(lookup: Lookup<'_>, key: &str, default: u32) -> SyncResult<NonZeroU32> {
    let value: u32 = parse_or(lookup, key, default)?;
    NonZeroU32::new(value)
        .ok_or_else(|| SyncError::Configuration(format!("{key} must be at least 1")))
}

impl NatsConfig {
    /// Load broker settings from the process environment
    ///
    /// - `NATS_URL` (comma-separated, default `nats://localhost:4222`)
    /// - `NATS_CLIENT_NAME`
    /// - `NATS_CONNECT_TIMEOUT_SECS` (10)
    /// - `NATS_REQUEST_TIMEOUT_SECS` (5)
    /// - `NATS_PUBLISH_TIMEOUT_SECS` (5)
    pub fn from_env(default_name: &str) -> SyncResult<Self> {
        Self::from_lookup(&env_lookup, default_name)
    }

    pub fn from_lookup(lookup: Lookup<'_>, default_name: &str) -> SyncResult<Self> {
        let defaults = NatsConfig::default();
        let servers = string_or(lookup, "NATS_URL", &defaults.servers.join(","))
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            servers,
            name: string_or(lookup, "NATS_CLIENT_NAME", default_name),
            connect_timeout: Duration::from_secs(parse_or(
                lookup,
                "NATS_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout.as_secs(),
            )?),
            request_timeout: Duration::from_secs(parse_or(
                lookup,
                "NATS_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            publish_timeout: Duration::from_secs(parse_or(
                lookup,
                "NATS_PUBLISH_TIMEOUT_SECS",
                defaults.publish_timeout.as_secs(),
            )?),
        })
    }
}

/// Downstream service a projector runs for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncService {
    /// Keeps credentials and a user replica
    Authorization,
    /// Keeps a user replica for device ownership
    Device,
    /// Keeps a device replica with consumption limits
    Monitoring,
}

impl SyncService {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncService::Authorization => "authorization",
            SyncService::Device => "device",
            SyncService::Monitoring => "monitoring",
        }
    }

    /// Domains whose sync events this service consumes
    pub fn domains(&self) -> &'static [Domain] {
        match self {
            SyncService::Authorization | SyncService::Device => &[Domain::User],
            SyncService::Monitoring => &[Domain::Device],
        }
    }
}

impl fmt::Display for SyncService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncService {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "authorization" => Ok(SyncService::Authorization),
            "device" => Ok(SyncService::Device),
            "monitoring" => Ok(SyncService::Monitoring),
            other => Err(format!("unknown service: {other}")),
        }
    }
}

/// Where replica rows and credentials are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// JetStream key-value buckets
    Kv,
    /// Process memory, lost on restart
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kv" => Ok(StoreBackend::Kv),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store: {other}")),
        }
    }
}

/// Identity projector settings
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub service: SyncService,
    /// JetStream stream holding the sync subjects
    pub stream: String,
    /// Redelivery delay after a storage failure
    pub retry_backoff: Duration,
    pub store: StoreBackend,
}

impl SyncConfig {
    pub const DEFAULT_STREAM: &'static str = "SYNC_EVENTS";

    pub fn from_env() -> SyncResult<Self> {
        Self::from_lookup(&env_lookup)
    }

    /// `SYNC_SERVICE` is required; `SYNC_STREAM`, `SYNC_RETRY_BACKOFF_MS` and
    /// `SYNC_STORE` have defaults.
    pub fn from_lookup(lookup: Lookup<'_>) -> SyncResult<Self> {
        let service = lookup("SYNC_SERVICE")
            .ok_or_else(|| SyncError::Configuration("SYNC_SERVICE not set".to_string()))?
            .trim()
            .parse::<SyncService>()
            .map_err(SyncError::Configuration)?;

        Ok(Self {
            service,
            stream: string_or(lookup, "SYNC_STREAM", Self::DEFAULT_STREAM),
            retry_backoff: Duration::from_millis(parse_or(lookup, "SYNC_RETRY_BACKOFF_MS", 1000)?),
            store: parse_or(lookup, "SYNC_STORE", StoreBackend::Kv)?,
        })
    }

    /// Durable consumer name for one domain, e.g. `authorization-user-sync`
    pub fn consumer_name(&self, domain: Domain) -> String {
        format!("{}-{}-sync", self.service, domain)
    }
}

/// Partitioning strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    ConsistentHashing,
    /// Batched round-robin with sticky assignments
    RoundRobin,
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "consistent-hashing" => Ok(StrategyKind::ConsistentHashing),
            "round-robin" => Ok(StrategyKind::RoundRobin),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}

/// Partition router settings
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub strategy: StrategyKind,
    pub placement: Placement,
    pub devices_per_replica: NonZeroU32,
    pub total_shards: NonZeroU32,
    pub ingest_prefix: String,
    pub device_data_subject: String,
    /// Deliveries of one message before it is dead-lettered
    pub max_deliveries: i64,
    pub retry_backoff: Duration,
    pub dead_letter_subject: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::ConsistentHashing,
            placement: Placement::Modulo,
            devices_per_replica: NonZeroU32::MIN.saturating_add(2),
            total_shards: NonZeroU32::MIN.saturating_add(2),
            ingest_prefix: INGEST_PREFIX.to_string(),
            device_data_subject: DEVICE_DATA_SUBJECT.to_string(),
            max_deliveries: 5,
            retry_backoff: Duration::from_millis(1000),
            dead_letter_subject: DEAD_LETTER_SUBJECT.to_string(),
        }
    }
}

impl RouterConfig {
    pub fn from_env() -> SyncResult<Self> {
        Self::from_lookup(&env_lookup)
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> SyncResult<Self> {
        let defaults = Self::default();
        let max_deliveries = parse_or(lookup, "LB_MAX_DELIVERIES", defaults.max_deliveries)?;
        if max_deliveries < 1 {
            return Err(SyncError::Configuration(
                "LB_MAX_DELIVERIES must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            strategy: parse_or(lookup, "LB_STRATEGY", defaults.strategy)?,
            placement: parse_or(lookup, "LB_HASH_PLACEMENT", defaults.placement)?,
            devices_per_replica: non_zero(
                lookup,
                "LB_DEVICES_PER_REPLICA",
                defaults.devices_per_replica.get(),
            )?,
            total_shards: non_zero(lookup, "MONITORING_REPLICAS", defaults.total_shards.get())?,
            ingest_prefix: string_or(lookup, "INGEST_SUBJECT_PREFIX", &defaults.ingest_prefix),
            device_data_subject: string_or(
                lookup,
                "DEVICE_DATA_SUBJECT",
                &defaults.device_data_subject,
            ),
            max_deliveries,
            retry_backoff: Duration::from_millis(parse_or(
                lookup,
                "LB_RETRY_BACKOFF_MS",
                defaults.retry_backoff.as_millis() as u64,
            )?),
            dead_letter_subject: string_or(
                lookup,
                "DEAD_LETTER_SUBJECT",
                &defaults.dead_letter_subject,
            ),
        })
    }
}
