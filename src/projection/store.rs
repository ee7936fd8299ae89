// Copyright (c) 2025 - Cowboy AI, Inc.
//! Replica storage
//!
//! Rows carry a revision. A save names the revision it read; if another
//! writer got there first the save fails with
//! [`SyncError::RevisionConflict`] and the caller re-reads and re-projects.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::{SyncError, SyncResult};

use super::snapshot::IdentitySnapshot;

/// Monotonic per-store row revision
pub type Revision = u64;

/// A stored value and the revision it was read at
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub revision: Revision,
}

/// Storage for one replica
#[async_trait]
pub trait ReplicaStore: Send + Sync {
    async fn load(&self, subject_id: i64) -> SyncResult<Option<Versioned<IdentitySnapshot>>>;

    /// Write a row
    ///
    /// `expected` is `None` when the row must not exist yet.
    async fn save(
        &self,
        snapshot: &IdentitySnapshot,
        expected: Option<Revision>,
    ) -> SyncResult<Revision>;

    /// Delete a row, returning whether one existed
    async fn remove(&self, subject_id: i64) -> SyncResult<bool>;

    async fn list(&self) -> SyncResult<Vec<IdentitySnapshot>>;

    /// Delete every row
    async fn clear(&self) -> SyncResult<()>;
}

/// Replica kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryReplicaStore {
    rows: DashMap<i64, Versioned<IdentitySnapshot>>,
    revision: AtomicU64,
}

impl InMemoryReplicaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn next_revision(&self) -> Revision {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl ReplicaStore for InMemoryReplicaStore {
    async fn load(&self, subject_id: i64) -> SyncResult<Option<Versioned<IdentitySnapshot>>> {
        Ok(self.rows.get(&subject_id).map(|row| row.value().clone()))
    }

    async fn save(
        &self,
        snapshot: &IdentitySnapshot,
        expected: Option<Revision>,
    ) -> SyncResult<Revision> {
        let conflict = || SyncError::RevisionConflict {
            key: snapshot.subject_id.to_string(),
        };

        match self.rows.entry(snapshot.subject_id) {
            Entry::Occupied(mut entry) => {
                if expected != Some(entry.get().revision) {
                    return Err(conflict());
                }
                let revision = self.next_revision();
                entry.insert(Versioned {
                    value: snapshot.clone(),
                    revision,
                });
                Ok(revision)
            }
            Entry::Vacant(entry) => {
                if expected.is_some() {
                    return Err(conflict());
                }
                let revision = self.next_revision();
                entry.insert(Versioned {
                    value: snapshot.clone(),
                    revision,
                });
                Ok(revision)
            }
        }
    }

    async fn remove(&self, subject_id: i64) -> SyncResult<bool> {
        Ok(self.rows.remove(&subject_id).is_some())
    }

    async fn list(&self) -> SyncResult<Vec<IdentitySnapshot>> {
        let mut rows: Vec<IdentitySnapshot> =
            self.rows.iter().map(|row| row.value().value.clone()).collect();
        rows.sort_by_key(|row| row.subject_id);
        Ok(rows)
    }

    async fn clear(&self) -> SyncResult<()> {
        self.rows.clear();
        Ok(())
    }
}
