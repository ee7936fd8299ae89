// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Replica Projection
//!
//! Delivery is at least once and unordered, so the projection must absorb
//! duplicates and converge regardless of whether a CREATED or an UPDATED
//! arrives first.

use proptest::prelude::*;

use sync_infrastructure::events::{fields, DomainEvent, EventKind};
use sync_infrastructure::projection::{fold_projection, replay_projection, ReplicaView};
use sync_infrastructure::subjects::Domain;

const ALLOW_LIST: &[&str] = &[fields::USERNAME, fields::ROLE, fields::PASSWORD];

// ============================================================================
// Property Test Strategies
// ============================================================================

fn optional_name() -> impl Strategy<Value = Option<&'static str>> {
    prop::option::of(prop::sample::select(vec!["ana", "bo", "cy"]))
}

fn optional_role() -> impl Strategy<Value = Option<&'static str>> {
    prop::option::of(prop::sample::select(vec!["client", "ADMIN", "Operator"]))
}

fn event_kind() -> impl Strategy<Value = EventKind> {
    prop_oneof![
        Just(EventKind::Created),
        Just(EventKind::Updated),
        Just(EventKind::Deleted),
    ]
}

/// User events over a handful of subjects so sequences collide
fn user_event() -> impl Strategy<Value = DomainEvent> {
    (1i64..5, event_kind(), optional_name(), optional_role(), any::<bool>()).prop_map(
        |(user_id, kind, username, role, with_password)| {
            let event = DomainEvent::new(Domain::User, kind, user_id);
            if kind == EventKind::Deleted {
                return event;
            }
            event
                .with_optional_field(fields::USERNAME, username)
                .with_optional_field(fields::ROLE, role)
                .with_optional_field(fields::PASSWORD, with_password.then_some("s3cret"))
        },
    )
}

fn event_sequence() -> impl Strategy<Value = Vec<DomainEvent>> {
    prop::collection::vec(user_event(), 0..40)
}

fn replay(events: &[DomainEvent]) -> ReplicaView {
    replay_projection(events, ALLOW_LIST)
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// Property: Replay is deterministic
    #[test]
    fn prop_replay_is_deterministic(events in event_sequence()) {
        prop_assert_eq!(replay(&events), replay(&events));
    }

    /// Property: Redelivering an event immediately changes nothing
    #[test]
    fn prop_duplicate_delivery_is_idempotent(events in event_sequence()) {
        let doubled: Vec<DomainEvent> = events
            .iter()
            .flat_map(|event| [event.clone(), event.clone()])
            .collect();

        let (view, outcomes) = fold_projection(ReplicaView::new(), &doubled, ALLOW_LIST);
        prop_assert_eq!(view, replay(&events));
        for pair in outcomes.chunks(2) {
            prop_assert!(pair[1].is_duplicate(), "second delivery had effect: {:?}", pair);
        }
    }

    /// Property: Redelivering the whole log keeps every row's fields
    #[test]
    fn prop_full_redelivery_is_stable(events in event_sequence()) {
        let once = replay(&events);
        let (twice, _) = fold_projection(once.clone(), &events, ALLOW_LIST);

        let fields_of = |view: &ReplicaView| {
            view.iter()
                .map(|(id, row)| (*id, row.display_fields.clone()))
                .collect::<Vec<_>>()
        };
        prop_assert_eq!(fields_of(&once), fields_of(&twice));
    }

    /// Property: Folding in two steps equals folding at once
    #[test]
    fn prop_fold_composes(events in event_sequence(), split in 0usize..40) {
        let split = split.min(events.len());
        let (head, tail) = events.split_at(split);

        let (partial, _) = fold_projection(ReplicaView::new(), head, ALLOW_LIST);
        let (stepped, _) = fold_projection(partial, tail, ALLOW_LIST);

        prop_assert_eq!(stepped, replay(&events));
    }

    /// Property: CREATED and UPDATED converge in either order
    #[test]
    fn prop_create_update_commute(
        username in optional_name(),
        created_role in optional_role(),
        updated_name in optional_name(),
        updated_role in optional_role(),
    ) {
        let created = DomainEvent::new(Domain::User, EventKind::Created, 42)
            .with_optional_field(fields::USERNAME, username)
            .with_optional_field(fields::ROLE, created_role);
        let updated = DomainEvent::user_updated(42, updated_name, None, updated_role);

        let in_order = replay(&[created.clone(), updated.clone()]);
        let reordered = replay(&[updated, created]);

        prop_assert_eq!(
            in_order.get(&42).map(|row| &row.display_fields),
            reordered.get(&42).map(|row| &row.display_fields)
        );
    }

    /// Property: A trailing DELETED always removes the row
    #[test]
    fn prop_delete_is_final(events in event_sequence(), user_id in 1i64..5) {
        let mut events = events;
        events.push(DomainEvent::user_deleted(user_id));

        prop_assert!(!replay(&events).contains_key(&user_id));
    }

    /// Property: Passwords never reach a replica
    #[test]
    fn prop_password_never_replicated(events in event_sequence()) {
        for row in replay(&events).values() {
            prop_assert!(row.field(fields::PASSWORD).is_none());
        }
    }
}
