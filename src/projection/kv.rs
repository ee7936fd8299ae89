// Copyright (c) 2025 - Cowboy AI, Inc.
//! Replica storage in a JetStream key-value bucket
//!
//! One key per subject id. The bucket revision of the key is the row
//! revision, so `update` with the revision that was read gives the same
//! compare-and-set the in-memory store provides.

use async_nats::jetstream::kv::{self, Operation};
use async_trait::async_trait;
use futures::TryStreamExt;
use tracing::debug;

use crate::errors::{SyncError, SyncResult};

use super::snapshot::IdentitySnapshot;
use super::store::{ReplicaStore, Revision, Versioned};

/// Replica backed by a key-value bucket
#[derive(Clone)]
pub struct KvReplicaStore {
    kv: kv::Store,
}

impl KvReplicaStore {
    pub fn new(kv: kv::Store) -> Self {
        Self { kv }
    }

    fn key(subject_id: i64) -> String {
        subject_id.to_string()
    }

    async fn live_entry(&self, key: &str) -> SyncResult<Option<kv::Entry>> {
        let entry = self
            .kv
            .entry(key)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        Ok(entry.filter(|entry| entry.operation == Operation::Put))
    }

    /// Turn a failed write into a conflict when the key moved underneath us
    async fn classify_write_error(
        &self,
        key: &str,
        expected: Option<Revision>,
        cause: String,
    ) -> SyncError {
        match self.live_entry(key).await {
            Ok(current) if current.as_ref().map(|entry| entry.revision) != expected => {
                SyncError::RevisionConflict {
                    key: key.to_string(),
                }
            }
            _ => SyncError::Storage(cause),
        }
    }
}

#[async_trait]
impl ReplicaStore for KvReplicaStore {
    async fn load(&self, subject_id: i64) -> SyncResult<Option<Versioned<IdentitySnapshot>>> {
        let Some(entry) = self.live_entry(&Self::key(subject_id)).await? else {
            return Ok(None);
        };
        let value: IdentitySnapshot = serde_json::from_slice(&entry.value)?;
        Ok(Some(Versioned {
            value,
            revision: entry.revision,
        }))
    }

    async fn save(
        &self,
        snapshot: &IdentitySnapshot,
        expected: Option<Revision>,
    ) -> SyncResult<Revision> {
        let key = Self::key(snapshot.subject_id);
        let payload: bytes::Bytes = serde_json::to_vec(snapshot)?.into();

        let written = match expected {
            Some(revision) => self
                .kv
                .update(&key, payload, revision)
                .await
                .map_err(|e| e.to_string()),
            None => {
                // A delete marker still holds the last revision of the key
                let marker = self
                    .kv
                    .entry(&key)
                    .await
                    .map_err(|e| SyncError::Storage(e.to_string()))?
                    .filter(|entry| entry.operation != Operation::Put);
                match marker {
                    Some(marker) => self
                        .kv
                        .update(&key, payload, marker.revision)
                        .await
                        .map_err(|e| e.to_string()),
                    // Expected revision 0 only succeeds for a key never written
                    None => self
                        .kv
                        .update(&key, payload, 0)
                        .await
                        .map_err(|e| e.to_string()),
                }
            }
        };

        match written {
            Ok(revision) => {
                debug!(key = %key, revision, "Replica row written");
                Ok(revision)
            }
            Err(cause) => Err(self.classify_write_error(&key, expected, cause).await),
        }
    }

    async fn remove(&self, subject_id: i64) -> SyncResult<bool> {
        let key = Self::key(subject_id);
        if self.live_entry(&key).await?.is_none() {
            return Ok(false);
        }
        self.kv
            .delete(&key)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        Ok(true)
    }

    async fn list(&self) -> SyncResult<Vec<IdentitySnapshot>> {
        let keys: Vec<String> = self
            .kv
            .keys()
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?
            .try_collect()
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        let mut rows = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = self.live_entry(&key).await? {
                rows.push(serde_json::from_slice::<IdentitySnapshot>(&entry.value)?);
            }
        }
        rows.sort_by_key(|row| row.subject_id);
        Ok(rows)
    }

    async fn clear(&self) -> SyncResult<()> {
        for row in self.list().await? {
            self.kv
                .purge(Self::key(row.subject_id))
                .await
                .map_err(|e| SyncError::Storage(e.to_string()))?;
        }
        Ok(())
    }
}
