// Copyright (c) 2025 - Cowboy AI, Inc.
//! Replica rows

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::events::{fields, DomainEvent, EventKind};

/// A downstream service's local copy of one subject
///
/// Holds only the fields on the consumer's allow-list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    pub subject_id: i64,
    pub display_fields: BTreeMap<String, Value>,
    pub last_applied_kind: EventKind,
}

impl IdentitySnapshot {
    pub fn new(subject_id: i64, last_applied_kind: EventKind) -> Self {
        Self {
            subject_id,
            display_fields: BTreeMap::new(),
            last_applied_kind,
        }
    }

    /// Build a row from an event's allowed fields
    pub fn from_event(event: &DomainEvent, allow_list: &[&str]) -> Self {
        let mut snapshot = Self::new(event.subject_id(), event.kind());
        snapshot.display_fields.extend(allowed_values(event, allow_list));
        snapshot
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.display_fields.get(name)
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }
}

/// Present, allowed, non-secret fields of an event, normalized for storage
pub fn allowed_values(event: &DomainEvent, allow_list: &[&str]) -> Vec<(String, Value)> {
    allow_list
        .iter()
        .filter(|name| !fields::is_sensitive(name))
        .filter_map(|name| {
            event
                .field(name)
                .map(|value| (name.to_string(), normalize(name, value)))
        })
        .collect()
}

fn normalize(name: &str, value: &Value) -> Value {
    match value {
        Value::String(s) if name == fields::ROLE => Value::String(s.to_uppercase()),
        other => other.clone(),
    }
}
