//! Record representation used between the transformer, archiver and loader.

use serde_json::Value;

/// One row: field name to JSON value, in insertion order.
pub type Record = serde_json::Map<String, Value>;

/// `true` when the field is absent or explicitly null.
pub fn is_missing(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

/// `true` when the field is missing or an empty string.
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(s)) => s.is_empty(),
        other => is_missing(other),
    }
}
