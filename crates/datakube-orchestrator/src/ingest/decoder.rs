//! Message body decoding
//!
//! Notification bodies are two JSON documents deep: the queue envelope carries the
//! storage event as a JSON-encoded string under `Message`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::filter::KeyFilter;

/// Errors raised while decoding a message body
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Message did not contain S3 records")]
    NoRecord,

    #[error("Malformed notification envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Malformed storage event: {0}")]
    MalformedEvent(String),

    #[error("Message body does not name an object key")]
    EmptyKey,
}

impl DecodeError {
    /// Short code used as the synthetic key when reporting the failure
    pub fn code(&self) -> &'static str {
        match self {
            DecodeError::NoRecord => "no_record",
            DecodeError::MalformedEnvelope(_) => "malformed_envelope",
            DecodeError::MalformedEvent(_) => "malformed_event",
            DecodeError::EmptyKey => "empty_key",
        }
    }
}

/// One object named by a storage event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub bucket: String,
    pub key: String,
}

impl ObjectRecord {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Location URI the dataset is registered under
    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

/// Records of one message, split by the key filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedEvent {
    pub selected: Vec<ObjectRecord>,
    pub skipped: Vec<ObjectRecord>,
}

/// How message bodies are laid out
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "kebab-case")]
pub enum BodyFormat {
    /// Storage event wrapped in a notification envelope
    #[default]
    Notification,
    /// The body is a bare object key in a fixed bucket
    ObjectKey { bucket: String },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Deserialize)]
struct StorageEvent {
    #[serde(rename = "Records")]
    records: Option<Vec<WireRecord>>,
}

#[derive(Deserialize)]
struct WireRecord {
    s3: WireEntity,
}

#[derive(Deserialize)]
struct WireEntity {
    bucket: WireBucket,
    object: WireObject,
}

#[derive(Deserialize)]
struct WireBucket {
    name: String,
}

#[derive(Deserialize)]
struct WireObject {
    key: String,
}

/// Parse a notification body into its object records
pub fn parse_notification(body: &str) -> Result<Vec<ObjectRecord>, DecodeError> {
    let envelope: Envelope =
        serde_json::from_str(body).map_err(|e| DecodeError::MalformedEnvelope(e.to_string()))?;

    let event: StorageEvent = serde_json::from_str(&envelope.message)
        .map_err(|e| DecodeError::MalformedEvent(e.to_string()))?;

    let records = event.records.ok_or(DecodeError::NoRecord)?;

    Ok(records
        .into_iter()
        .map(|record| ObjectRecord::new(record.s3.bucket.name, record.s3.object.key))
        .collect())
}

/// Turns message bodies into filtered object records. Pure: the same body always
/// decodes to the same result.
#[derive(Debug, Clone, Default)]
pub struct EventDecoder {
    format: BodyFormat,
    filter: KeyFilter,
}

impl EventDecoder {
    pub fn new(format: BodyFormat, filter: KeyFilter) -> Self {
        Self { format, filter }
    }

    pub fn decode(&self, body: &str) -> Result<DecodedEvent, DecodeError> {
        let records = match &self.format {
            BodyFormat::Notification => parse_notification(body)?,
            BodyFormat::ObjectKey { bucket } => {
                let key = body.trim();
                if key.is_empty() {
                    return Err(DecodeError::EmptyKey);
                }
                vec![ObjectRecord::new(bucket.clone(), key)]
            },
        };

        let mut decoded = DecodedEvent::default();
        for record in records {
            if self.filter.selects(&record.key) {
                decoded.selected.push(record);
            } else {
                debug!(key = %record.key, "Skipped as it does not match prefix filters");
                decoded.skipped.push(record);
            }
        }

        Ok(decoded)
    }
}
