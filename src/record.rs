use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::constants::RESERVED_FIELDS;
use crate::id::RecordId;

/// Named attributes of a record, in the order the caller supplied them
pub type Fields = serde_json::Map<String, Value>;

/// A persisted entity instance (course, gallery image, hero slide, ...)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    #[serde(rename = "_id")]
    pub id: RecordId,
    #[serde(flatten)]
    pub fields: Fields,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// String value of a field, if present and a string
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

/// Drop server-owned keys and reject values that are not a scalar or an array of scalars.
pub fn sanitize_fields(mut fields: Fields) -> Result<Fields, String> {
    for key in RESERVED_FIELDS {
        fields.remove(key);
    }

    let mut rejected: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| !is_storable(value))
        .map(|(name, _)| name.as_str())
        .collect();

    if rejected.is_empty() {
        return Ok(fields);
    }
    rejected.sort_unstable();
    Err(format!(
        "Fields must be strings, numbers, booleans or arrays of those: {}",
        rejected.join(", ")
    ))
}

fn is_storable(value: &Value) -> bool {
    match value {
        Value::Object(_) => false,
        Value::Array(items) => items
            .iter()
            .all(|item| !matches!(item, Value::Object(_) | Value::Array(_) | Value::Null)),
        _ => true,
    }
}

/// Missing-equivalent values for required fields
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
