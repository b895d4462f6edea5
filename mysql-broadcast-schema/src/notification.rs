use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum NotificationError {
    #[error("malformed notification body: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("notification body must be a JSON object, found {found}")]
    NotAnObject { found: &'static str },
}

/// A single row-level change pushed by a database trigger.
///
/// The payload is an arbitrary JSON object; its shape is decided by the trigger
/// that produced it. Construction only succeeds for objects, so every value of
/// this type is a well-formed key/value record.
#[derive(Debug, Clone)]
pub struct ChangeNotification {
    fields: Map<String, Value>,
    received_at: DateTime<Utc>,
}

impl ChangeNotification {
    pub fn from_value(value: Value) -> Result<Self, NotificationError> {
        match value {
            Value::Object(fields) => Ok(Self {
                fields,
                received_at: Utc::now(),
            }),
            other => Err(NotificationError::NotAnObject {
                found: json_kind(&other),
            }),
        }
    }

    pub fn from_slice(body: &[u8]) -> Result<Self, NotificationError> {
        let value: Value = serde_json::from_slice(body)?;
        Self::from_value(value)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    /// When the listener decoded this record. Not part of the payload.
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// `table` field, when the trigger follows the conventional payload shape.
    pub fn table(&self) -> Option<&str> {
        self.fields.get("table").and_then(Value::as_str)
    }

    /// `op` field (insert/update/delete), when present.
    pub fn op(&self) -> Option<&str> {
        self.fields.get("op").and_then(Value::as_str)
    }
}

/// Equality is on the payload; `received_at` is not part of it.
impl PartialEq for ChangeNotification {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Serialize for ChangeNotification {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.fields.serialize(serializer)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
