// Copyright (c) 2025 - Cowboy AI, Inc.
//! Identity domain events and their wire format
//!
//! Events are decoded leniently: a body without `subjectId` or `eventType`
//! is ignored rather than rejected, because the sync subjects are shared by
//! producers that predate the current envelope. Everything else that cannot
//! be interpreted is a [`SyncError::MalformedEvent`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::{SyncError, SyncResult};
use crate::subjects::{Domain, SubjectBuilder};

/// Field names carried by identity events
pub mod fields {
    pub const USERNAME: &str = "username";
    pub const ROLE: &str = "role";
    pub const PASSWORD: &str = "password";
    pub const MAX_CONSUMPTION: &str = "maxConsumption";

    /// Fields whose values must never be logged or replicated
    pub const SENSITIVE: &[&str] = &[PASSWORD];

    pub fn is_sensitive(name: &str) -> bool {
        SENSITIVE.contains(&name)
    }
}

const EVENT_TYPE_KEY: &str = "eventType";
const ACTION_KEY: &str = "action";
const SUBJECT_ID_KEY: &str = "subjectId";
const DOMAIN_KEY: &str = "domain";

/// What happened to the subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

impl EventKind {
    pub fn as_wire(&self) -> &'static str {
        match self {
            EventKind::Created => "CREATED",
            EventKind::Updated => "UPDATED",
            EventKind::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl FromStr for EventKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CREATED" => Ok(EventKind::Created),
            "UPDATED" => Ok(EventKind::Updated),
            "DELETED" => Ok(EventKind::Deleted),
            other => Err(SyncError::MalformedEvent(format!(
                "unknown event type: {other}"
            ))),
        }
    }
}

/// Identity event published by an owning service
///
/// Fields map to `None` when the producer sent an explicit `null`; consumers
/// treat that the same as an absent field.
#[derive(Clone, PartialEq)]
pub struct DomainEvent {
    subject_id: i64,
    kind: EventKind,
    domain: Domain,
    fields: BTreeMap<String, Option<Value>>,
}

/// Result of decoding a sync message body
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A well-formed event
    Event(DomainEvent),
    /// Not an identity event this protocol understands; acknowledge and move on
    Ignored(&'static str),
}

impl DomainEvent {
    /// Create an event with no fields
    pub fn new(domain: Domain, kind: EventKind, subject_id: i64) -> Self {
        Self {
            subject_id,
            kind,
            domain,
            fields: BTreeMap::new(),
        }
    }

    /// Attach a field value
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), Some(value.into()));
        self
    }

    /// Attach a field only when a value is present
    pub fn with_optional_field<V: Into<Value>>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with_field(name, value),
            None => self,
        }
    }

    pub fn user_created(user_id: i64, username: &str, password: &str, role: &str) -> Self {
        Self::new(Domain::User, EventKind::Created, user_id)
            .with_field(fields::USERNAME, username)
            .with_field(fields::PASSWORD, password)
            .with_field(fields::ROLE, role)
    }

    pub fn user_updated(
        user_id: i64,
        username: Option<&str>,
        password: Option<&str>,
        role: Option<&str>,
    ) -> Self {
        Self::new(Domain::User, EventKind::Updated, user_id)
            .with_optional_field(fields::USERNAME, username)
            .with_optional_field(fields::PASSWORD, password)
            .with_optional_field(fields::ROLE, role)
    }

    pub fn user_deleted(user_id: i64) -> Self {
        Self::new(Domain::User, EventKind::Deleted, user_id)
    }

    pub fn device_created(device_id: i64, max_consumption: Option<f64>) -> Self {
        Self::new(Domain::Device, EventKind::Created, device_id)
            .with_optional_field(fields::MAX_CONSUMPTION, max_consumption)
    }

    pub fn device_updated(device_id: i64, max_consumption: Option<f64>) -> Self {
        Self::new(Domain::Device, EventKind::Updated, device_id)
            .with_optional_field(fields::MAX_CONSUMPTION, max_consumption)
    }

    pub fn device_deleted(device_id: i64) -> Self {
        Self::new(Domain::Device, EventKind::Deleted, device_id)
    }

    pub fn subject_id(&self) -> i64 {
        self.subject_id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// All fields as sent, including explicit nulls
    pub fn fields(&self) -> &BTreeMap<String, Option<Value>> {
        &self.fields
    }

    /// A field value that is present and not null
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).and_then(Option::as_ref)
    }

    /// A present string field
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    /// Routing subject for this event
    pub fn subject(&self) -> String {
        SubjectBuilder::new().domain(self.domain).build()
    }

    /// Decode a message body
    ///
    /// `delivery_subject` is used to resolve the domain when the body does
    /// not name it.
    pub fn decode(payload: &[u8], delivery_subject: Option<&str>) -> SyncResult<Decoded> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| SyncError::MalformedEvent(format!("invalid JSON: {e}")))?;

        let Value::Object(body) = value else {
            return Err(SyncError::MalformedEvent(
                "event body is not an object".to_string(),
            ));
        };

        Self::from_wire(body, delivery_subject)
    }

    fn from_wire(mut body: Map<String, Value>, delivery_subject: Option<&str>) -> SyncResult<Decoded> {
        let raw_kind = take_non_null(&mut body, EVENT_TYPE_KEY);
        let raw_action = take_non_null(&mut body, ACTION_KEY);
        let Some(raw_kind) = raw_kind.or(raw_action) else {
            return Ok(Decoded::Ignored("missing eventType"));
        };
        let kind = match raw_kind {
            Value::String(s) => s.parse::<EventKind>()?,
            other => {
                return Err(SyncError::MalformedEvent(format!(
                    "eventType is not a string: {other}"
                )))
            }
        };

        // subjectId wins over the legacy per-domain keys
        let mut id_source: Option<Domain> = None;
        let mut raw_id = take_non_null(&mut body, SUBJECT_ID_KEY);
        for domain in Domain::ALL {
            let legacy = take_non_null(&mut body, domain.legacy_id_key());
            if raw_id.is_none() && legacy.is_some() {
                raw_id = legacy;
                id_source = Some(domain);
            }
        }
        let Some(raw_id) = raw_id else {
            return Ok(Decoded::Ignored("missing subjectId"));
        };
        let subject_id = raw_id.as_i64().ok_or_else(|| {
            SyncError::MalformedEvent(format!("subjectId is not an integer: {raw_id}"))
        })?;

        let domain = match take_non_null(&mut body, DOMAIN_KEY) {
            Some(Value::String(s)) => s
                .parse::<Domain>()
                .map_err(SyncError::MalformedEvent)?,
            Some(other) => {
                return Err(SyncError::MalformedEvent(format!(
                    "domain is not a string: {other}"
                )))
            }
            None => delivery_subject
                .and_then(Domain::from_subject)
                .or(id_source)
                .ok_or_else(|| {
                    SyncError::MalformedEvent(format!(
                        "cannot determine domain for subject {subject_id}"
                    ))
                })?,
        };

        let fields = body
            .into_iter()
            .map(|(name, value)| {
                let value = if value.is_null() { None } else { Some(value) };
                (name, value)
            })
            .collect();

        Ok(Decoded::Event(Self {
            subject_id,
            kind,
            domain,
            fields,
        }))
    }

    /// Encode to the JSON wire shape
    pub fn to_wire(&self) -> Value {
        let mut body = Map::new();
        body.insert(EVENT_TYPE_KEY.to_string(), Value::from(self.kind.as_wire()));
        body.insert(SUBJECT_ID_KEY.to_string(), Value::from(self.subject_id));
        body.insert(DOMAIN_KEY.to_string(), Value::from(self.domain.as_wire()));
        for (name, value) in &self.fields {
            if let Some(value) = value {
                body.insert(name.clone(), value.clone());
            }
        }
        Value::Object(body)
    }

    /// Encode to a message payload
    pub fn to_bytes(&self) -> SyncResult<Bytes> {
        Ok(serde_json::to_vec(&self.to_wire())?.into())
    }
}

fn take_non_null(body: &mut Map<String, Value>, key: &str) -> Option<Value> {
    body.remove(key).filter(|value| !value.is_null())
}

impl fmt::Debug for DomainEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted: BTreeMap<&str, String> = self
            .fields
            .iter()
            .map(|(name, value)| {
                let shown = match value {
                    None => "null".to_string(),
                    Some(_) if fields::is_sensitive(name) => "***".to_string(),
                    Some(value) => value.to_string(),
                };
                (name.as_str(), shown)
            })
            .collect();

        f.debug_struct("DomainEvent")
            .field("subject_id", &self.subject_id)
            .field("kind", &self.kind)
            .field("domain", &self.domain)
            .field("fields", &redacted)
            .finish()
    }
}
