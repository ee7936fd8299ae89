// Copyright (c) 2025 - Cowboy AI, Inc.
//! Credential Lifecycle
//!
//! Credentials are created once. A repeated CREATED leaves the stored
//! credential alone, an UPDATED for a missing credential synthesizes one only
//! when the event carries everything a credential needs, and DELETED is
//! idempotent.

use super::{StateMachine, TransitionError, TransitionResult};

/// Whether a credential exists for the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialState {
    Absent,
    Active,
}

/// Event kind plus what the event carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialInput {
    /// `complete` when username, password and role are all present
    Create { complete: bool },
    /// `complete` when username, role and a non-empty password are present
    Update { complete: bool },
    Delete,
}

/// Store mutation implied by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialTransition {
    Insert,
    /// Duplicate CREATED; the stored credential wins
    Keep,
    Patch,
    /// UPDATED for a missing credential, rebuilt from the event
    Synthesize,
    Remove,
    /// DELETED for a missing credential
    Noop,
}

impl StateMachine for CredentialState {
    type Input = CredentialInput;
    type Output = CredentialTransition;

    fn transition(
        &self,
        input: &CredentialInput,
    ) -> TransitionResult<(Self, CredentialTransition)> {
        use CredentialState::*;
        use CredentialTransition::*;

        match (self, input) {
            (_, CredentialInput::Create { complete: false }) => Err(
                TransitionError::PreconditionFailed(
                    "CREATED requires username, password and role".to_string(),
                ),
            ),
            (Absent, CredentialInput::Create { complete: true }) => Ok((Active, Insert)),
            (Active, CredentialInput::Create { complete: true }) => Ok((Active, Keep)),
            (Absent, CredentialInput::Update { complete: true }) => Ok((Active, Synthesize)),
            (Absent, CredentialInput::Update { complete: false }) => {
                Err(TransitionError::InvalidTransition {
                    from: "Absent".to_string(),
                    input: "partial UPDATED".to_string(),
                })
            }
            (Active, CredentialInput::Update { .. }) => Ok((Active, Patch)),
            (Absent, CredentialInput::Delete) => Ok((Absent, Noop)),
            (Active, CredentialInput::Delete) => Ok((Absent, Remove)),
        }
    }
}
