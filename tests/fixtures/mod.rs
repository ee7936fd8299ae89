// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for sync-infrastructure
//!
//! Deterministic events, telemetry payloads and in-memory collaborators with
//! failure injection.
//!
//! # Design Principles
//! - Fixed ids and timestamps, no `Utc::now()` in fixture data
//! - Collaborators fail only when a test asks them to

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use sync_infrastructure::credentials::PasswordHasher;
use sync_infrastructure::events::{DeviceTelemetryRecord, DomainEvent};
use sync_infrastructure::partition::KeyHasher;
use sync_infrastructure::projection::{
    IdentitySnapshot, InMemoryReplicaStore, ReplicaStore, Revision, Versioned,
};
use sync_infrastructure::{MessageSink, SyncError, SyncResult};

pub const USER_ID: i64 = 42;
pub const DEVICE_ID: i64 = 7;

/// Fixed device timestamp (2025-11-03T10:00:00)
pub fn fixed_timestamp() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 11, 3)
        .and_then(|date| date.and_hms_opt(10, 0, 0))
        .expect("valid fixture timestamp")
}

pub fn telemetry(device_id: i64, measured_value: f64) -> DeviceTelemetryRecord {
    DeviceTelemetryRecord::new(fixed_timestamp(), device_id, measured_value)
}

pub fn telemetry_payload(device_id: i64) -> Vec<u8> {
    format!(
        r#"{{"timestamp":"2025-11-03T10:00:00","device_id":{device_id},"measured_value":0.42}}"#
    )
    .into_bytes()
}

/// The user 42 event sequence: created as a client, promoted, deleted
pub fn user_lifecycle() -> Vec<DomainEvent> {
    vec![
        DomainEvent::user_created(USER_ID, "ana", "s3cret", "client"),
        DomainEvent::user_updated(USER_ID, None, None, Some("ADMIN")),
        DomainEvent::user_deleted(USER_ID),
    ]
}

/// Message sink that records what it is sent
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(String, Bytes)>>,
    down: AtomicBool,
    failures_left: AtomicUsize,
    hang: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every message until brought back up
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Refuse the next `count` messages
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Never complete a send
    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, Bytes)> {
        self.sent.lock().expect("sink lock").clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent().into_iter().map(|(subject, _)| subject).collect()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send(&self, subject: &str, payload: Bytes) -> SyncResult<()> {
        if self.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.down.load(Ordering::SeqCst) {
            return Err(SyncError::BrokerUnavailable("connection refused".to_string()));
        }
        let consumed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if consumed.is_ok() {
            return Err(SyncError::BrokerUnavailable("injected failure".to_string()));
        }

        self.sent
            .lock()
            .expect("sink lock")
            .push((subject.to_string(), payload));
        Ok(())
    }
}

/// Key hasher that always returns the same hash
pub struct FixedHasher(pub u32);

impl KeyHasher for FixedHasher {
    fn hash32(&self, _key: &str) -> Option<u32> {
        Some(self.0)
    }
}

/// Fast reversible hasher for credential tests
pub struct PlainHasher;

impl PasswordHasher for PlainHasher {
    fn hash(&self, password: &str) -> SyncResult<String> {
        Ok(format!("plain:{password}"))
    }

    fn verify(&self, password: &str, hash: &str) -> SyncResult<bool> {
        Ok(hash == format!("plain:{password}"))
    }
}

/// Replica store whose writes can be made to fail
#[derive(Default)]
pub struct FlakyReplicaStore {
    inner: InMemoryReplicaStore,
    failing: AtomicBool,
}

impl FlakyReplicaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    fn check(&self) -> SyncResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(SyncError::Storage("replica database unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ReplicaStore for FlakyReplicaStore {
    async fn load(&self, subject_id: i64) -> SyncResult<Option<Versioned<IdentitySnapshot>>> {
        self.inner.load(subject_id).await
    }

    async fn save(
        &self,
        snapshot: &IdentitySnapshot,
        expected: Option<Revision>,
    ) -> SyncResult<Revision> {
        self.check()?;
        self.inner.save(snapshot, expected).await
    }

    async fn remove(&self, subject_id: i64) -> SyncResult<bool> {
        self.check()?;
        self.inner.remove(subject_id).await
    }

    async fn list(&self) -> SyncResult<Vec<IdentitySnapshot>> {
        self.inner.list().await
    }

    async fn clear(&self) -> SyncResult<()> {
        self.check()?;
        self.inner.clear().await
    }
}
