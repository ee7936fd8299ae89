// Copyright (c) 2025 - Cowboy AI, Inc.
//! Replica Row Lifecycle
//!
//! ```text
//!            CREATED / UPDATED (self-heal)
//!   Absent ─────────────────────────────────> Present
//!     ^  │                                    │  ^
//!     │  └─ DELETED (ignore)                  │  └─ CREATED (merge) / UPDATED
//!     └────────────────── DELETED ────────────┘
//! ```
//!
//! Every (state, event) pair has a transition. Replicas must converge no
//! matter the delivery order, so nothing is ever rejected here.

use crate::events::EventKind;

use super::{StateMachine, TransitionResult};

/// Whether the replica currently holds a row for the subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplicaState {
    Absent,
    Present,
}

/// Store mutation implied by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplicaTransition {
    /// Insert a new row from the event
    Create,
    /// Fill fields the existing row lacks; never overwrite
    Merge,
    /// Update arrived for an unseen subject; synthesize the row
    SelfHeal,
    /// Last write wins on the fields the event carries
    Update,
    /// Delete the row
    Remove,
    /// Nothing to do
    Ignore,
}

impl ReplicaState {
    pub fn from_row<T>(row: Option<&T>) -> Self {
        match row {
            Some(_) => ReplicaState::Present,
            None => ReplicaState::Absent,
        }
    }
}

impl StateMachine for ReplicaState {
    type Input = EventKind;
    type Output = ReplicaTransition;

    fn transition(&self, input: &EventKind) -> TransitionResult<(Self, ReplicaTransition)> {
        use ReplicaState::*;
        use ReplicaTransition::*;

        let next = match (self, input) {
            (Absent, EventKind::Created) => (Present, Create),
            (Absent, EventKind::Updated) => (Present, SelfHeal),
            (Absent, EventKind::Deleted) => (Absent, Ignore),
            (Present, EventKind::Created) => (Present, Merge),
            (Present, EventKind::Updated) => (Present, Update),
            (Present, EventKind::Deleted) => (Absent, Remove),
        };
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ReplicaState::Absent, EventKind::Created => (ReplicaState::Present, ReplicaTransition::Create))]
    #[test_case(ReplicaState::Absent, EventKind::Updated => (ReplicaState::Present, ReplicaTransition::SelfHeal))]
    #[test_case(ReplicaState::Absent, EventKind::Deleted => (ReplicaState::Absent, ReplicaTransition::Ignore))]
    #[test_case(ReplicaState::Present, EventKind::Created => (ReplicaState::Present, ReplicaTransition::Merge))]
    #[test_case(ReplicaState::Present, EventKind::Updated => (ReplicaState::Present, ReplicaTransition::Update))]
    #[test_case(ReplicaState::Present, EventKind::Deleted => (ReplicaState::Absent, ReplicaTransition::Remove))]
    fn test_transition_table(state: ReplicaState, kind: EventKind) -> (ReplicaState, ReplicaTransition) {
        state.transition(&kind).unwrap()
    }

    #[test]
    fn test_every_input_is_accepted() {
        for state in [ReplicaState::Absent, ReplicaState::Present] {
            for kind in [EventKind::Created, EventKind::Updated, EventKind::Deleted] {
                assert!(state.can_transition(&kind));
            }
        }
    }
}
