//! Normalization of raw event records into storage rows
//!
//! Records arrive as loosely typed JSON objects. A record becomes an
//! [`EventRow`] only when every column in `EVENT_KEYS` can be extracted;
//! anything else is reported as a [`RecordError`] and skipped by the worker.

use chrono::{DateTime, Utc};
use event_schema::JSON_FIELDS;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// One normalized row, fields in canonical column order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRow {
    pub event_id: String,
    pub event_timestamp: DateTime<Utc>,
    pub event_type: String,
    pub event_version: String,
    pub app_title: String,
    pub app_version: String,
    pub user_id: String,
    pub user_name: String,
    /// Serialized JSON text
    pub meta: String,
    /// Serialized JSON text
    pub token_payload: String,
}

impl EventRow {
    pub fn from_record(record: &Value) -> Result<Self, RecordError> {
        let object = record.as_object().ok_or(RecordError::NotAnObject)?;

        // JSON fields are defaulted before the required-field check, so they never go missing
        let [meta, token_payload] = JSON_FIELDS.map(|field| json_text(object, field));
        let (meta, token_payload) = (meta?, token_payload?);

        let event_id = required_text(object, "event_id")?;
        if event_id.trim().is_empty() {
            return Err(RecordError::InvalidField {
                field: "event_id",
                reason: "must not be empty".to_string(),
            });
        }

        let raw_timestamp = required_text(object, "event_timestamp")?;
        let event_timestamp = DateTime::parse_from_rfc3339(&raw_timestamp)
            .map_err(|e| RecordError::InvalidField {
                field: "event_timestamp",
                reason: format!("{} ({})", e, raw_timestamp),
            })?
            .with_timezone(&Utc);

        Ok(Self {
            event_id,
            event_timestamp,
            event_type: required_text(object, "event_type")?,
            event_version: required_text(object, "event_version")?,
            app_title: required_text(object, "app_title")?,
            app_version: required_text(object, "app_version")?,
            user_id: required_text(object, "user_id")?,
            user_name: required_text(object, "user_name")?,
            meta,
            token_payload,
        })
    }
}

fn required_text(object: &Map<String, Value>, field: &'static str) -> Result<String, RecordError> {
    let text = match object.get(field) {
        None | Some(Value::Null) => return Err(RecordError::MissingField(field)),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(_) => {
            return Err(RecordError::InvalidField {
                field,
                reason: "expected a scalar value".to_string(),
            })
        }
    };

    if text.contains('\0') {
        return Err(nul_character(field));
    }
    Ok(text)
}

fn json_text(object: &Map<String, Value>, field: &'static str) -> Result<String, RecordError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok("{}".to_string()),
        Some(value) if contains_nul(value) => Err(nul_character(field)),
        Some(value) => serde_json::to_string(value).map_err(|e| RecordError::InvalidField {
            field,
            reason: e.to_string(),
        }),
    }
}

/// PostgreSQL refuses U+0000 in both TEXT and JSONB
fn contains_nul(value: &Value) -> bool {
    match value {
        Value::String(s) => s.contains('\0'),
        Value::Array(items) => items.iter().any(contains_nul),
        Value::Object(map) => map
            .iter()
            .any(|(key, v)| key.contains('\0') || contains_nul(v)),
        _ => false,
    }
}

fn nul_character(field: &'static str) -> RecordError {
    RecordError::InvalidField {
        field,
        reason: "contains a NUL character".to_string(),
    }
}
