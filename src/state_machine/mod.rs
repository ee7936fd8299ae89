// Copyright (c) 2025 - Cowboy AI, Inc.
//! Finite State Machine Abstractions
//!
//! Replica rows and credentials both follow small lifecycles driven by the
//! kind of identity event that arrives. The lifecycles are modeled as Mealy
//! machines: the output depends on the current state and the input.
//!
//! ```text
//! (State, Input) → (State, Output)
//! ```
//!
//! Transitions are pure. The output tells the caller which store mutation to
//! perform; the machine itself never touches storage.
//!
//! # Lifecycles
//!
//! - [`replica_lifecycle`] - one replica row per subject id
//! - [`credential_lifecycle`] - one credential per user id
//!
//! # Example
//!
//! ```rust
//! use sync_infrastructure::events::EventKind;
//! use sync_infrastructure::state_machine::StateMachine;
//! use sync_infrastructure::state_machine::replica_lifecycle::{ReplicaState, ReplicaTransition};
//!
//! let (next, output) = ReplicaState::Absent.transition(&EventKind::Updated).unwrap();
//! assert_eq!(next, ReplicaState::Present);
//! assert_eq!(output, ReplicaTransition::SelfHeal);
//! ```

pub mod credential_lifecycle;
pub mod replica_lifecycle;

/// Outcome of feeding one input to a machine
pub type TransitionResult<S> = Result<S, TransitionError>;

/// Why a machine refused an input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The input makes no sense in this state
    #[error("{input} not accepted while {from}")]
    InvalidTransition { from: String, input: String },

    /// The input lacks something the transition needs
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
}

/// A lifecycle driven by event kinds
pub trait StateMachine: Sized + Clone {
    type Input;

    /// Store mutation implied by a transition
    type Output;

    /// Next state and the mutation to perform
    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)>;

    /// Whether `input` is accepted in this state
    fn can_transition(&self, input: &Self::Input) -> bool {
        self.transition(input).is_ok()
    }

    /// Fold a run of inputs, stopping at the first refusal
    fn run<'a, I>(&self, inputs: I) -> TransitionResult<(Self, Vec<Self::Output>)>
    where
        I: IntoIterator<Item = &'a Self::Input>,
        Self::Input: 'a,
    {
        inputs
            .into_iter()
            .try_fold((self.clone(), Vec::new()), |(state, mut outputs), input| {
                let (next, output) = state.transition(input)?;
                outputs.push(output);
                Ok((next, outputs))
            })
    }
}
