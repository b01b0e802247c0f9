//! Analytics event schema shared by the queue consumer and the storage worker
//!
//! Publishers emit `AnalyticsEvent` records onto the analytics SNS topic; the
//! topic fans them out to SQS wrapped in a notification envelope (see
//! [`envelope`]). The worker stores every record as one row whose columns
//! follow [`EVENT_KEYS`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// SNS notification envelope delivered by the queue
pub mod envelope;

pub use envelope::{decode_body, EnvelopeError, QueueEnvelope};

/// Storage columns in canonical insert order.
///
/// Every key is required on an incoming record; the two JSON fields default
/// to `{}` before the check runs.
pub const EVENT_KEYS: [&str; 10] = [
    "event_id",
    "event_timestamp",
    "event_type",
    "event_version",
    "app_title",
    "app_version",
    "user_id",
    "user_name",
    "meta",
    "token_payload",
];

/// Structured payload fields stored as JSON text
pub const JSON_FIELDS: [&str; 2] = ["meta", "token_payload"];

/// Unique conflict key of the events table
pub const CONFLICT_KEY: &str = "event_id";

/// Schema version stamped on events created through [`AnalyticsEvent::new`]
pub const DEFAULT_EVENT_VERSION: &str = "1.0";

/// A single analytics event as published upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    /// Globally unique identifier, used for deduplication at the storage layer
    pub event_id: String,
    /// When the event happened at the source
    pub event_timestamp: DateTime<Utc>,
    pub event_type: String,
    pub event_version: String,
    pub app_title: String,
    pub app_version: String,
    pub user_id: String,
    pub user_name: String,
    /// Free-form event metadata
    #[serde(default = "empty_object")]
    pub meta: Value,
    /// Claims of the token the event was issued under
    #[serde(default = "empty_object")]
    pub token_payload: Value,
}

impl AnalyticsEvent {
    pub fn new(
        event_type: impl Into<String>,
        app_title: impl Into<String>,
        app_version: impl Into<String>,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_timestamp: Utc::now(),
            event_type: event_type.into(),
            event_version: DEFAULT_EVENT_VERSION.to_string(),
            app_title: app_title.into(),
            app_version: app_version.into(),
            user_id: user_id.into(),
            user_name: user_name.into(),
            meta: empty_object(),
            token_payload: empty_object(),
        }
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_token_payload(mut self, token_payload: Value) -> Self {
        self.token_payload = token_payload;
        self
    }

    /// Render the event as a JSON object, the shape the worker receives
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}
