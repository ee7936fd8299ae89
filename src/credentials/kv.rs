// Copyright (c) 2025 - Cowboy AI, Inc.
//! Credentials in JetStream key-value buckets
//!
//! Two buckets: rows keyed by user id, and a username index whose keys are
//! the hex-encoded username (key characters are restricted) and whose value
//! is the owning user id. A write expecting revision 0 on the index is the
//! uniqueness check.

use async_nats::jetstream::kv::{self, Operation};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::errors::{SyncError, SyncResult};

use super::{Credential, CredentialStore, InsertOutcome, NewCredential, UpdateOutcome};

#[derive(Clone)]
pub struct KvCredentialStore {
    rows: kv::Store,
    usernames: kv::Store,
}

fn storage(err: impl std::fmt::Display) -> SyncError {
    SyncError::Storage(err.to_string())
}

fn index_key(username: &str) -> String {
    let hex: String = username.bytes().map(|b| format!("{b:02x}")).collect();
    format!("u_{hex}")
}

impl KvCredentialStore {
    pub fn new(rows: kv::Store, usernames: kv::Store) -> Self {
        Self { rows, usernames }
    }

    async fn live(store: &kv::Store, key: &str) -> SyncResult<Option<kv::Entry>> {
        let entry = store.entry(key).await.map_err(storage)?;
        Ok(entry.filter(|entry| entry.operation == Operation::Put))
    }

    async fn row(&self, user_id: i64) -> SyncResult<Option<(Credential, u64)>> {
        match Self::live(&self.rows, &user_id.to_string()).await? {
            Some(entry) => Ok(Some((serde_json::from_slice(&entry.value)?, entry.revision))),
            None => Ok(None),
        }
    }

    async fn owner_of(&self, username: &str) -> SyncResult<Option<i64>> {
        match Self::live(&self.usernames, &index_key(username)).await? {
            Some(entry) => {
                let owner = std::str::from_utf8(&entry.value)
                    .ok()
                    .and_then(|raw| raw.parse().ok())
                    .ok_or_else(|| storage(format!("corrupt username index for {username}")))?;
                Ok(Some(owner))
            }
            None => Ok(None),
        }
    }

    /// Claim `username` for `user_id`, returning the index revision
    ///
    /// `None` when another user holds it.
    async fn claim(&self, username: &str, user_id: i64) -> SyncResult<Option<u64>> {
        let key = index_key(username);
        let value = Bytes::from(user_id.to_string());
        match Self::live(&self.usernames, &key).await? {
            Some(entry) if entry.value == value => Ok(Some(entry.revision)),
            Some(_) => Ok(None),
            None => {
                let claimed = match self.usernames.entry(&key).await.map_err(storage)? {
                    Some(marker) => self.usernames.update(&key, value, marker.revision).await.map_err(storage),
                    None => self.usernames.update(&key, value, 0).await.map_err(storage),
                };
                match claimed {
                    Ok(revision) => Ok(Some(revision)),
                    Err(e) => match self.owner_of(username).await? {
                        // Lost a race for the key
                        Some(owner) if owner != user_id => Ok(None),
                        _ => Err(e),
                    },
                }
            }
        }
    }

    /// Undo the side effects of a row write that did not land
    ///
    /// A fresh username claim is released unless the row now carries it.
    /// The error is a conflict only when the row moved since it was read.
    async fn abandon_update(
        &self,
        credential: &Credential,
        renamed: bool,
        read_revision: u64,
        cause: impl std::fmt::Display,
    ) -> SyncError {
        let current = match self.row(credential.user_id).await {
            Ok(current) => current,
            Err(e) => return e,
        };

        let holds_new_name = current
            .as_ref()
            .is_some_and(|(row, _)| row.username == credential.username);
        if renamed && !holds_new_name {
            if let Err(e) = self.release(&credential.username).await {
                warn!(
                    user_id = credential.user_id,
                    error = %e,
                    "Failed to release username claim"
                );
            }
        }

        match current {
            Some((_, revision)) if revision != read_revision => SyncError::RevisionConflict {
                key: credential.user_id.to_string(),
            },
            None => SyncError::RevisionConflict {
                key: credential.user_id.to_string(),
            },
            Some(_) => storage(cause),
        }
    }

    async fn release(&self, username: &str) -> SyncResult<()> {
        self.usernames
            .delete(index_key(username))
            .await
            .map_err(storage)
    }
}

#[async_trait]
impl CredentialStore for KvCredentialStore {
    async fn find_by_user_id(&self, user_id: i64) -> SyncResult<Option<Credential>> {
        Ok(self.row(user_id).await?.map(|(credential, _)| credential))
    }

    async fn find_by_username(&self, username: &str) -> SyncResult<Option<Credential>> {
        match self.owner_of(username).await? {
            Some(user_id) => self.find_by_user_id(user_id).await,
            None => Ok(None),
        }
    }

    async fn insert(&self, credential: NewCredential) -> SyncResult<InsertOutcome> {
        if self.row(credential.user_id).await?.is_some() {
            return Ok(InsertOutcome::UserExists);
        }
        let Some(id) = self.claim(&credential.username, credential.user_id).await? else {
            return Ok(InsertOutcome::UsernameTaken);
        };

        let stored = credential.into_credential(id);
        let key = stored.user_id.to_string();
        let payload: Bytes = serde_json::to_vec(&stored)?.into();
        let written = match self.rows.entry(&key).await.map_err(storage)? {
            Some(marker) if marker.operation != Operation::Put => {
                self.rows.update(&key, payload, marker.revision).await.map_err(storage)
            }
            Some(_) => return Ok(InsertOutcome::UserExists),
            None => self.rows.update(&key, payload, 0).await.map_err(storage),
        };

        match written {
            Ok(revision) => {
                debug!(user_id = stored.user_id, revision, "Credential row created");
                Ok(InsertOutcome::Inserted(stored))
            }
            Err(e) => {
                if self.row(stored.user_id).await?.is_some() {
                    Ok(InsertOutcome::UserExists)
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn update(&self, credential: &Credential) -> SyncResult<UpdateOutcome> {
        let Some((previous, revision)) = self.row(credential.user_id).await? else {
            return Ok(UpdateOutcome::Missing);
        };

        let renamed = previous.username != credential.username;
        if renamed && self.claim(&credential.username, credential.user_id).await?.is_none() {
            return Ok(UpdateOutcome::UsernameTaken);
        }

        let key = credential.user_id.to_string();
        let payload: Bytes = serde_json::to_vec(credential)?.into();
        if let Err(e) = self.rows.update(&key, payload, revision).await {
            return Err(self.abandon_update(credential, renamed, revision, e).await);
        }

        if renamed {
            self.release(&previous.username).await?;
        }
        Ok(UpdateOutcome::Updated)
    }

    async fn delete_by_user_id(&self, user_id: i64) -> SyncResult<bool> {
        let Some((previous, _)) = self.row(user_id).await? else {
            return Ok(false);
        };
        self.rows
            .delete(user_id.to_string())
            .await
            .map_err(storage)?;
        self.release(&previous.username).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_key_is_kv_safe() {
        assert_eq!(index_key("ana"), "u_616e61");
        assert!(index_key("ana maria@example.com")
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }
}
