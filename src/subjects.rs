// Copyright (c) 2025 - Cowboy AI, Inc.

//! NATS subject hierarchy for sync and telemetry messages
//!
//! Identity events travel on one subject per owning domain:
//!
//! ```text
//! {domain}.sync
//! ```
//!
//! Telemetry enters on a single ingest subject and leaves on one of N shard
//! subjects built from a prefix and a 1-based shard number:
//!
//! ```text
//! device.data  ──router──>  ingest.queue.{1..N}
//! ```
//!
//! # Examples
//!
//! ```rust
//! use sync_infrastructure::subjects::{Domain, SubjectBuilder};
//!
//! let subject = SubjectBuilder::new().domain(Domain::User).build();
//! assert_eq!(subject, "user.sync");
//!
//! assert_eq!(SubjectBuilder::shard("ingest.queue.", 3), "ingest.queue.3");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Suffix shared by every identity sync subject
pub const SYNC_SUFFIX: &str = "sync";

/// Default subject for raw device measurements
pub const DEVICE_DATA_SUBJECT: &str = "device.data";

/// Default prefix of shard subjects
pub const INGEST_PREFIX: &str = "ingest.queue.";

/// Default subject for telemetry that could not be routed
pub const DEAD_LETTER_SUBJECT: &str = "ingest.dead_letter";

/// Owning domain of an identity event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Domain {
    /// Users owned by the user service
    User,
    /// Devices owned by the device service
    Device,
}

impl Domain {
    /// All domains, in routing order
    pub const ALL: [Domain; 2] = [Domain::User, Domain::Device];

    /// Wire name used inside event bodies
    pub fn as_wire(&self) -> &'static str {
        match self {
            Domain::User => "USER",
            Domain::Device => "DEVICE",
        }
    }

    /// Legacy body key that carried the subject id for this domain
    pub fn legacy_id_key(&self) -> &'static str {
        match self {
            Domain::User => "userId",
            Domain::Device => "deviceId",
        }
    }

    /// Resolve the domain from a `{domain}.sync` subject
    pub fn from_subject(subject: &str) -> Option<Self> {
        let (domain, suffix) = subject.split_once('.')?;
        if suffix != SYNC_SUFFIX {
            return None;
        }
        domain.parse().ok()
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::User => write!(f, "user"),
            Domain::Device => write!(f, "device"),
        }
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Domain::User),
            "device" => Ok(Domain::Device),
            other => Err(format!("unknown domain: {other}")),
        }
    }
}

/// Builder for sync subjects
#[derive(Debug, Clone, Default)]
pub struct SubjectBuilder {
    domain: Option<Domain>,
}

impl SubjectBuilder {
    /// Create a new subject builder
    pub fn new() -> Self {
        Self { domain: None }
    }

    /// Set the owning domain
    pub fn domain(mut self, domain: Domain) -> Self {
        self.domain = Some(domain);
        self
    }

    /// Build the routing subject
    ///
    /// Returns `{domain}.sync`, or `*.sync` when no domain was set.
    pub fn build(&self) -> String {
        match self.domain {
            Some(domain) => format!("{}.{}", domain, SYNC_SUFFIX),
            None => Self::build_all(),
        }
    }

    /// Subscription matching every domain's sync subject
    pub fn build_all() -> String {
        format!("*.{}", SYNC_SUFFIX)
    }

    /// Shard subject for a 1-based shard number
    pub fn shard(prefix: &str, shard: u32) -> String {
        format!("{}{}", prefix, shard)
    }

    /// Wildcard covering every shard subject under `prefix`
    ///
    /// `ingest.queue.` becomes `ingest.queue.*`.
    pub fn shard_wildcard(prefix: &str) -> String {
        if prefix.ends_with('.') {
            format!("{}*", prefix)
        } else {
            format!("{}.*", prefix)
        }
    }
}
