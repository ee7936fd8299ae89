// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for replication and routing operations

use thiserror::Error;

/// Errors that can occur while publishing, projecting or routing
#[derive(Debug, Error)]
pub enum SyncError {
    /// The broker could not accept or deliver a message
    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// Event or message body cannot be interpreted
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// Telemetry could not be republished to its shard channel
    #[error("Routing to {subject} failed: {cause}")]
    Routing { subject: String, cause: String },

    /// Replica or credential storage failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// A row changed between load and save
    #[error("Revision conflict for {key}")]
    RevisionConflict { key: String },

    /// Secret material could not be processed
    #[error("Credential error: {0}")]
    Credential(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    /// Returns true if retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::BrokerUnavailable(_)
                | SyncError::Routing { .. }
                | SyncError::Storage(_)
                | SyncError::RevisionConflict { .. }
                | SyncError::Timeout(_)
        )
    }
}

impl From<async_nats::Error> for SyncError {
    fn from(err: async_nats::Error) -> Self {
        SyncError::BrokerUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}
