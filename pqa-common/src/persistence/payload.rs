//! Flattened JSON payload of a [`SessionRecord`]
//!
//! ```json
//! {
//!   "fiction__A lighthouse keeper": { "ranking": {...}, "ratings": {...}, "feedback": {...} },
//!   "workflow_feedback": "...",
//!   "last_saved": "2025-06-01T10:00:00Z"
//! }
//! ```
//!
//! Item keys always contain the `__` separator and a known category; the two
//! session-level keys contain neither, so they can never be mistaken for items.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::record::{ItemAnnotation, ItemKey, SessionRecord};

/// Session-level free-text feedback
pub const WORKFLOW_FEEDBACK_KEY: &str = "workflow_feedback";

/// Timestamp of the save that produced the payload
pub const LAST_SAVED_KEY: &str = "last_saved";

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload root must be a JSON object")]
    NotAnObject,

    #[error("unrecognised payload key '{0}'")]
    UnknownKey(String),

    #[error("invalid annotation under '{key}': {source}")]
    Item {
        key: String,
        source: serde_json::Error,
    },

    #[error("invalid '{key}' value: {detail}")]
    Field { key: &'static str, detail: String },
}

/// Flatten a record into a JSON object
pub fn to_value(record: &SessionRecord) -> Result<Value, PayloadError> {
    let mut root = Map::new();
    for (key, annotation) in record.items() {
        root.insert(key.encode(), serde_json::to_value(annotation)?);
    }
    root.insert(
        WORKFLOW_FEEDBACK_KEY.to_string(),
        Value::String(record.workflow_feedback.clone()),
    );
    root.insert(
        LAST_SAVED_KEY.to_string(),
        serde_json::to_value(record.last_saved)?,
    );
    Ok(Value::Object(root))
}

pub fn encode(record: &SessionRecord) -> Result<String, PayloadError> {
    Ok(serde_json::to_string(&to_value(record)?)?)
}

pub fn decode(raw: &str) -> Result<SessionRecord, PayloadError> {
    from_value(serde_json::from_str(raw)?)
}

/// Rebuild a record; missing session-level keys fall back to defaults
pub fn from_value(value: Value) -> Result<SessionRecord, PayloadError> {
    let Value::Object(root) = value else {
        return Err(PayloadError::NotAnObject);
    };

    let mut record = SessionRecord::new();
    for (key, value) in root {
        match key.as_str() {
            WORKFLOW_FEEDBACK_KEY => {
                record.workflow_feedback = match value {
                    Value::Null => String::new(),
                    Value::String(text) => text,
                    other => {
                        return Err(PayloadError::Field {
                            key: WORKFLOW_FEEDBACK_KEY,
                            detail: format!("expected string, found {}", other),
                        })
                    }
                };
            }
            LAST_SAVED_KEY => {
                record.last_saved = serde_json::from_value::<Option<DateTime<Utc>>>(value)
                    .map_err(|e| PayloadError::Field {
                        key: LAST_SAVED_KEY,
                        detail: e.to_string(),
                    })?;
            }
            _ => {
                let item_key =
                    ItemKey::decode(&key).ok_or_else(|| PayloadError::UnknownKey(key.clone()))?;
                let mut annotation: ItemAnnotation = serde_json::from_value(value)
                    .map_err(|source| PayloadError::Item { key, source })?;
                annotation.fill_defaults();
                record.insert(item_key, annotation);
            }
        }
    }
    Ok(record)
}
