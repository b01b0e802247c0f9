//! SNS notification envelope
//!
//! Events reach SQS through an SNS subscription without raw message delivery,
//! so each queue body is a notification object whose `Message` field holds
//! the event JSON as a string:
//!
//! ```json
//! {
//!   "Type": "Notification",
//!   "MessageId": "b1946ac9-...",
//!   "TopicArn": "arn:aws:sns:eu-central-1:123456789012:analytics-events",
//!   "Message": "{\"event_id\": \"...\", \"meta\": {}}",
//!   "Timestamp": "2024-03-01T12:00:00.000Z"
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Queue body is not a notification object with a string `Message`
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(serde_json::Error),

    /// `Message` is not valid JSON
    #[error("Invalid event payload: {0}")]
    InvalidPayload(serde_json::Error),

    #[error("Failed to encode envelope: {0}")]
    Encode(serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEnvelope {
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub notification_type: Option<String>,

    #[serde(rename = "MessageId", default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    #[serde(rename = "TopicArn", default, skip_serializing_if = "Option::is_none")]
    pub topic_arn: Option<String>,

    /// Stringified event JSON
    #[serde(rename = "Message")]
    pub message: String,

    #[serde(rename = "Timestamp", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl QueueEnvelope {
    /// Wrap a record the way the topic does, with only the `Message` field set
    pub fn wrap<T: Serialize>(record: &T) -> Result<Self, EnvelopeError> {
        Ok(Self {
            notification_type: None,
            message_id: None,
            topic_arn: None,
            message: serde_json::to_string(record).map_err(EnvelopeError::Encode)?,
            timestamp: None,
        })
    }

    pub fn from_body(body: &str) -> Result<Self, EnvelopeError> {
        serde_json::from_str(body).map_err(EnvelopeError::InvalidEnvelope)
    }

    pub fn to_body(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(EnvelopeError::Encode)
    }

    /// Parse the inner event JSON
    pub fn decode_record(&self) -> Result<Value, EnvelopeError> {
        serde_json::from_str(&self.message).map_err(EnvelopeError::InvalidPayload)
    }
}

/// Unwrap a queue body down to the event record it carries
pub fn decode_body(body: &str) -> Result<Value, EnvelopeError> {
    QueueEnvelope::from_body(body)?.decode_record()
}
