// Copyright (c) 2025 - Cowboy AI, Inc.
//! Device measurements and dead-letter envelopes

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{SyncError, SyncResult};

/// One measurement emitted by a device
///
/// The timestamp is the device's local wall-clock time with no zone, as the
/// simulator emits it (`2025-11-03T10:00:00`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceTelemetryRecord {
    pub timestamp: NaiveDateTime,
    pub device_id: i64,
    pub measured_value: f64,
}

impl DeviceTelemetryRecord {
    pub fn new(timestamp: NaiveDateTime, device_id: i64, measured_value: f64) -> Self {
        Self {
            timestamp,
            device_id,
            measured_value,
        }
    }

    /// Decode an ingest payload
    pub fn decode(payload: &[u8]) -> SyncResult<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| SyncError::MalformedEvent(format!("invalid telemetry record: {e}")))
    }

    pub fn to_bytes(&self) -> SyncResult<Bytes> {
        Ok(serde_json::to_vec(self)?.into())
    }
}

/// Envelope for a telemetry message that was given up on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Subject the message was consumed from
    pub source_subject: String,
    /// Original body, lossily decoded as UTF-8
    pub payload: String,
    pub error: String,
    /// Delivery attempts made before giving up
    pub attempts: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<i64>,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(
        source_subject: impl Into<String>,
        payload: &[u8],
        error: &SyncError,
        attempts: u64,
        device_id: Option<i64>,
    ) -> Self {
        Self {
            source_subject: source_subject.into(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            error: error.to_string(),
            attempts,
            device_id,
            failed_at: Utc::now(),
        }
    }

    pub fn to_bytes(&self) -> SyncResult<Bytes> {
        Ok(serde_json::to_vec(self)?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 3)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_decode_simulator_payload() {
        let payload = br#"{"timestamp": "2025-11-03T10:00:00", "device_id": 7, "measured_value": 0.42}"#;
        let record = DeviceTelemetryRecord::decode(payload).unwrap();
        assert_eq!(record, DeviceTelemetryRecord::new(at(10, 0), 7, 0.42));
    }

    #[test]
    fn test_encode_keeps_wire_names() {
        let record = DeviceTelemetryRecord::new(at(10, 10), 3, 1.5);
        let value: serde_json::Value = serde_json::from_slice(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"timestamp": "2025-11-03T10:10:00", "device_id": 3, "measured_value": 1.5})
        );
    }

    #[test]
    fn test_decode_rejects_missing_device() {
        let payload = br#"{"timestamp": "2025-11-03T10:00:00", "measured_value": 0.42}"#;
        assert!(matches!(
            DeviceTelemetryRecord::decode(payload),
            Err(SyncError::MalformedEvent(_))
        ));
    }

    #[test]
    fn test_dead_letter_envelope() {
        let err = SyncError::Routing {
            subject: "ingest.queue.1".to_string(),
            cause: "timed out".to_string(),
        };
        let letter = DeadLetter::new("device.data", b"{\"device_id\":1}", &err, 5, Some(1));
        assert_eq!(letter.payload, "{\"device_id\":1}");
        assert_eq!(letter.attempts, 5);
        assert!(letter.error.contains("ingest.queue.1"));
    }
}
