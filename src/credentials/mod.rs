// Copyright (c) 2025 - Cowboy AI, Inc.
//! Replicated login credentials
//!
//! The authorization service keeps its own credential table, fed by user
//! events. Each user has at most one credential and each username belongs to
//! at most one user.

pub mod consumer;
pub mod kv;
pub mod password;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;

use crate::errors::SyncResult;

pub use consumer::CredentialLifecycleConsumer;
pub use kv::KvCredentialStore;
pub use password::{Argon2PasswordHasher, PasswordHasher};

/// Stored login credential
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub id: u64,
    pub user_id: i64,
    pub username: String,
    pub password_hash: String,
    /// Upper case
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("password_hash", &"***")
            .field("role", &self.role)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Credential to insert; the store assigns the id and timestamps
#[derive(Clone)]
pub struct NewCredential {
    pub user_id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: String,
}

impl NewCredential {
    pub fn into_credential(self, id: u64) -> Credential {
        let now = Utc::now();
        Credential {
            id,
            user_id: self.user_id,
            username: self.username,
            password_hash: self.password_hash,
            role: self.role.to_uppercase(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(Credential),
    /// The user already has a credential
    UserExists,
    /// Another user holds the username
    UsernameTaken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// No credential for the user
    Missing,
    /// Another user holds the new username
    UsernameTaken,
}

/// Credential table keyed by user id with a unique username index
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_user_id(&self, user_id: i64) -> SyncResult<Option<Credential>>;

    async fn find_by_username(&self, username: &str) -> SyncResult<Option<Credential>>;

    async fn insert(&self, credential: NewCredential) -> SyncResult<InsertOutcome>;

    /// Replace the credential of `credential.user_id`
    async fn update(&self, credential: &Credential) -> SyncResult<UpdateOutcome>;

    /// Returns whether a credential existed
    async fn delete_by_user_id(&self, user_id: i64) -> SyncResult<bool>;
}

#[derive(Debug, Default)]
struct CredentialTable {
    rows: HashMap<i64, Credential>,
    by_username: HashMap<String, i64>,
    next_id: u64,
}

/// Credentials kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    table: RwLock<CredentialTable>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_user_id(&self, user_id: i64) -> SyncResult<Option<Credential>> {
        Ok(self.table.read().await.rows.get(&user_id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> SyncResult<Option<Credential>> {
        let table = self.table.read().await;
        Ok(table
            .by_username
            .get(username)
            .and_then(|user_id| table.rows.get(user_id))
            .cloned())
    }

    async fn insert(&self, credential: NewCredential) -> SyncResult<InsertOutcome> {
        let mut table = self.table.write().await;
        if table.rows.contains_key(&credential.user_id) {
            return Ok(InsertOutcome::UserExists);
        }
        if table.by_username.contains_key(&credential.username) {
            return Ok(InsertOutcome::UsernameTaken);
        }

        table.next_id += 1;
        let stored = credential.into_credential(table.next_id);
        table
            .by_username
            .insert(stored.username.clone(), stored.user_id);
        table.rows.insert(stored.user_id, stored.clone());
        Ok(InsertOutcome::Inserted(stored))
    }

    async fn update(&self, credential: &Credential) -> SyncResult<UpdateOutcome> {
        let mut table = self.table.write().await;
        let Some(previous) = table.rows.get(&credential.user_id).cloned() else {
            return Ok(UpdateOutcome::Missing);
        };

        if previous.username != credential.username {
            if table.by_username.contains_key(&credential.username) {
                return Ok(UpdateOutcome::UsernameTaken);
            }
            table.by_username.remove(&previous.username);
            table
                .by_username
                .insert(credential.username.clone(), credential.user_id);
        }
        table.rows.insert(credential.user_id, credential.clone());
        Ok(UpdateOutcome::Updated)
    }

    async fn delete_by_user_id(&self, user_id: i64) -> SyncResult<bool> {
        let mut table = self.table.write().await;
        match table.rows.remove(&user_id) {
            Some(previous) => {
                table.by_username.remove(&previous.username);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
