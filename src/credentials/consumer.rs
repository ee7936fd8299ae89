// Copyright (c) 2025 - Cowboy AI, Inc.
//! Credential lifecycle consumer
//!
//! Applies user events to the credential table, then to the authorization
//! service's user replica. The password in the event is hashed on the way in
//! and never reaches the replica or the logs.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::errors::{SyncError, SyncResult};
use crate::events::{fields, DomainEvent, EventKind};
use crate::projection::{
    ApplyOutcome, IdentityProjectionConsumer, ProjectionAdapter, ReplicaStore,
};
use crate::state_machine::credential_lifecycle::{
    CredentialInput, CredentialState, CredentialTransition,
};
use crate::state_machine::{StateMachine, TransitionError};
use crate::subjects::Domain;

use super::password::PasswordHasher;
use super::{Credential, CredentialStore, InsertOutcome, NewCredential, UpdateOutcome};

/// Credentials plus user replica for the authorization service
pub struct CredentialLifecycleConsumer<C: CredentialStore, S: ReplicaStore> {
    credentials: Arc<C>,
    hasher: Arc<dyn PasswordHasher>,
    replica: IdentityProjectionConsumer<S>,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

impl<C: CredentialStore, S: ReplicaStore> CredentialLifecycleConsumer<C, S> {
    pub fn new(
        credentials: Arc<C>,
        hasher: Arc<dyn PasswordHasher>,
        replica: IdentityProjectionConsumer<S>,
    ) -> Self {
        Self {
            credentials,
            hasher,
            replica,
        }
    }

    pub fn credentials(&self) -> &Arc<C> {
        &self.credentials
    }

    pub fn replica(&self) -> &IdentityProjectionConsumer<S> {
        &self.replica
    }

    /// Apply a user event to credentials, then to the user replica
    pub async fn apply(&self, event: &DomainEvent) -> SyncResult<ApplyOutcome> {
        if event.domain() != Domain::User {
            return Ok(ApplyOutcome::Ignored("event for another domain"));
        }

        self.apply_credential(event).await?;
        self.replica.apply(event).await
    }

    /// Check a login against the stored hash
    pub async fn verify(&self, username: &str, password: &str) -> SyncResult<Option<Credential>> {
        let Some(credential) = self.credentials.find_by_username(username).await? else {
            return Ok(None);
        };
        if self.hasher.verify(password, &credential.password_hash)? {
            Ok(Some(credential))
        } else {
            Ok(None)
        }
    }

    async fn apply_credential(&self, event: &DomainEvent) -> SyncResult<()> {
        let user_id = event.subject_id();
        let username = present(event.field_str(fields::USERNAME));
        let password = present(event.field_str(fields::PASSWORD));
        let role = present(event.field_str(fields::ROLE));

        let existing = self.credentials.find_by_user_id(user_id).await?;
        let state = match existing {
            Some(_) => CredentialState::Active,
            None => CredentialState::Absent,
        };
        let complete = username.is_some() && password.is_some() && role.is_some();
        let input = match event.kind() {
            EventKind::Created => CredentialInput::Create { complete },
            EventKind::Updated => CredentialInput::Update { complete },
            EventKind::Deleted => CredentialInput::Delete,
        };

        let transition = match state.transition(&input) {
            Ok((_, transition)) => transition,
            Err(TransitionError::PreconditionFailed(reason)) => {
                return Err(SyncError::MalformedEvent(format!("user {user_id}: {reason}")));
            }
            Err(e) => {
                warn!(user_id, error = %e, "Credential not found for update, skipping");
                return Ok(());
            }
        };

        match (transition, username, password, role) {
            (CredentialTransition::Insert, Some(username), Some(password), Some(role))
            | (CredentialTransition::Synthesize, Some(username), Some(password), Some(role)) => {
                let credential = NewCredential {
                    user_id,
                    username: username.to_string(),
                    password_hash: self.hasher.hash(password)?,
                    role: role.to_string(),
                };
                match self.credentials.insert(credential).await? {
                    InsertOutcome::Inserted(_) if transition == CredentialTransition::Synthesize => {
                        warn!(user_id, "Credential missing on update, synthesized from event")
                    }
                    InsertOutcome::Inserted(_) => info!(user_id, "Credential created"),
                    InsertOutcome::UserExists => {
                        warn!(user_id, "Credential already exists, keeping stored credential")
                    }
                    InsertOutcome::UsernameTaken => {
                        error!(user_id, username, "Username owned by another user, credential not created")
                    }
                }
            }
            (CredentialTransition::Keep, ..) => {
                warn!(user_id, "Credential already exists, keeping stored credential");
            }
            (CredentialTransition::Patch, ..) => {
                if let Some(current) = existing {
                    self.patch(current, username, password, role).await?;
                }
            }
            (CredentialTransition::Remove, ..) => {
                if self.credentials.delete_by_user_id(user_id).await? {
                    info!(user_id, "Credential deleted");
                }
            }
            (CredentialTransition::Noop, ..) => {
                debug!(user_id, "No credential to delete");
            }
            (CredentialTransition::Insert | CredentialTransition::Synthesize, ..) => {
                return Err(SyncError::MalformedEvent(format!(
                    "user {user_id}: credential fields missing"
                )));
            }
        }
        Ok(())
    }

    async fn patch(
        &self,
        current: Credential,
        username: Option<&str>,
        password: Option<&str>,
        role: Option<&str>,
    ) -> SyncResult<()> {
        let user_id = current.user_id;
        let mut next = current.clone();

        if let Some(username) = username {
            next.username = username.to_string();
        }
        if let Some(password) = password {
            next.password_hash = self.hasher.hash(password)?;
        }
        if let Some(role) = role {
            next.role = role.to_uppercase();
        }

        if next == current {
            debug!(user_id, "Credential already current");
            return Ok(());
        }
        next.updated_at = Utc::now();

        match self.credentials.update(&next).await? {
            UpdateOutcome::Updated => info!(user_id, "Credential updated"),
            UpdateOutcome::Missing => warn!(user_id, "Credential vanished before update"),
            UpdateOutcome::UsernameTaken => {
                error!(user_id, username = %next.username, "Username owned by another user, credential not updated")
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<C, S> ProjectionAdapter for CredentialLifecycleConsumer<C, S>
where
    C: CredentialStore + 'static,
    S: ReplicaStore + 'static,
{
    fn name(&self) -> &str {
        "authorization-credentials"
    }

    async fn project(&self, event: &DomainEvent) -> SyncResult<ApplyOutcome> {
        self.apply(event).await
    }
}
