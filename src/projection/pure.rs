// Copyright (c) 2025 - Cowboy AI, Inc.
//! Pure Projection
//!
//! The projection of one event onto one replica row is a pure function:
//!
//! ```text
//! (Option<Row>, Event) → (Action, Outcome)
//! ```
//!
//! The action is returned as data and the consumer performs it against its
//! store. Replay is a fold of the same function over an ordered event list.
//!
//! Rules that make delivery order irrelevant to the converged state:
//!
//! - CREATED for a known subject fills only the fields the row lacks, so a
//!   duplicate or late CREATED cannot undo an UPDATED.
//! - UPDATED for an unknown subject creates the row (self-heal).
//! - UPDATED overwrites only the fields it carries.
//! - DELETED for an unknown subject does nothing.

use std::collections::BTreeMap;

use crate::events::DomainEvent;
use crate::state_machine::replica_lifecycle::{ReplicaState, ReplicaTransition};
use crate::state_machine::StateMachine;

use super::snapshot::{allowed_values, IdentitySnapshot};

/// Store mutation to perform
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicaAction {
    /// Write this row
    Put(IdentitySnapshot),
    /// Delete the row
    Remove,
    /// Leave the store untouched
    Keep,
}

/// What applying the event meant for the row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectionOutcome {
    Created,
    Updated,
    /// Row was missing and an UPDATED rebuilt it
    SelfHealed,
    /// Duplicate CREATED filled missing fields
    Merged,
    /// Row already matched the event
    Unchanged,
    Deleted,
    /// DELETED for a subject with no row
    AlreadyAbsent,
}

impl ProjectionOutcome {
    /// Whether the event changed nothing because it was already reflected
    pub fn is_duplicate(&self) -> bool {
        matches!(self, ProjectionOutcome::Unchanged | ProjectionOutcome::AlreadyAbsent)
    }
}

/// Result of projecting one event
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub action: ReplicaAction,
    pub outcome: ProjectionOutcome,
}

impl Projection {
    fn put(row: IdentitySnapshot, outcome: ProjectionOutcome) -> Self {
        Self {
            action: ReplicaAction::Put(row),
            outcome,
        }
    }

    fn keep(outcome: ProjectionOutcome) -> Self {
        Self {
            action: ReplicaAction::Keep,
            outcome,
        }
    }
}

/// In-memory replica keyed by subject id
pub type ReplicaView = BTreeMap<i64, IdentitySnapshot>;

/// Project one event onto the current row
pub fn project_event(
    current: Option<&IdentitySnapshot>,
    event: &DomainEvent,
    allow_list: &[&str],
) -> Projection {
    let state = ReplicaState::from_row(current);
    let transition = match state.transition(&event.kind()) {
        Ok((_, transition)) => transition,
        Err(_) => ReplicaTransition::Ignore,
    };

    match (transition, current) {
        (ReplicaTransition::Create, _) => Projection::put(
            IdentitySnapshot::from_event(event, allow_list),
            ProjectionOutcome::Created,
        ),
        (ReplicaTransition::SelfHeal, _) => Projection::put(
            IdentitySnapshot::from_event(event, allow_list),
            ProjectionOutcome::SelfHealed,
        ),
        (ReplicaTransition::Merge, Some(row)) => {
            let mut next = row.clone();
            let mut changed = false;
            for (name, value) in allowed_values(event, allow_list) {
                if !next.display_fields.contains_key(&name) {
                    next.display_fields.insert(name, value);
                    changed = true;
                }
            }
            if changed {
                next.last_applied_kind = event.kind();
                Projection::put(next, ProjectionOutcome::Merged)
            } else {
                Projection::keep(ProjectionOutcome::Unchanged)
            }
        }
        (ReplicaTransition::Update, Some(row)) => {
            let mut next = row.clone();
            let mut changed = false;
            for (name, value) in allowed_values(event, allow_list) {
                if next.display_fields.get(&name) != Some(&value) {
                    next.display_fields.insert(name, value);
                    changed = true;
                }
            }
            if changed {
                next.last_applied_kind = event.kind();
                Projection::put(next, ProjectionOutcome::Updated)
            } else {
                Projection::keep(ProjectionOutcome::Unchanged)
            }
        }
        (ReplicaTransition::Remove, _) => Projection {
            action: ReplicaAction::Remove,
            outcome: ProjectionOutcome::Deleted,
        },
        (ReplicaTransition::Ignore, _)
        | (ReplicaTransition::Merge, None)
        | (ReplicaTransition::Update, None) => Projection::keep(ProjectionOutcome::AlreadyAbsent),
    }
}

/// Apply one event to an in-memory replica
pub fn apply_to_view(
    view: &mut ReplicaView,
    event: &DomainEvent,
    allow_list: &[&str],
) -> ProjectionOutcome {
    let projection = project_event(view.get(&event.subject_id()), event, allow_list);
    match projection.action {
        ReplicaAction::Put(row) => {
            view.insert(row.subject_id, row);
        }
        ReplicaAction::Remove => {
            view.remove(&event.subject_id());
        }
        ReplicaAction::Keep => {}
    }
    projection.outcome
}

/// Fold a sequence of events through the projection
///
/// Returns the final replica and the outcome of each event in order.
pub fn fold_projection<'a, I>(
    initial: ReplicaView,
    events: I,
    allow_list: &[&str],
) -> (ReplicaView, Vec<ProjectionOutcome>)
where
    I: IntoIterator<Item = &'a DomainEvent>,
{
    events
        .into_iter()
        .fold((initial, Vec::new()), |(mut view, mut outcomes), event| {
            outcomes.push(apply_to_view(&mut view, event, allow_list));
            (view, outcomes)
        })
}

/// Rebuild a replica from scratch
pub fn replay_projection<'a, I>(events: I, allow_list: &[&str]) -> ReplicaView
where
    I: IntoIterator<Item = &'a DomainEvent>,
{
    fold_projection(ReplicaView::new(), events, allow_list).0
}
