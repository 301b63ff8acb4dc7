use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const UNKNOWN_RESOURCE: &str = "Unknown";
pub const UNKNOWN_ERROR: &str = "Unknown error";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub resource_kind: String,
    pub resource_name: String,
    pub error_text: String,
    pub has_error: bool,
    pub details_text: String,
}

/// One element of the tool's `results` array as it appears on the wire.
#[derive(Debug, Default, Deserialize)]
struct RawResult {
    #[serde(default)]
    kind: Option<Value>,
    #[serde(default)]
    name: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    details: Option<Value>,
}

impl Finding {
    /// Decodes one result record. Returns `None` only when `value` is not an
    /// object; every missing or ill-typed field falls back to its default.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        let raw: RawResult = serde_json::from_value(value.clone()).unwrap_or_default();

        let (has_error, error_text) = decode_error(raw.error.as_ref());
        Some(Self {
            resource_kind: string_or(raw.kind.as_ref(), UNKNOWN_RESOURCE),
            resource_name: string_or(raw.name.as_ref(), UNKNOWN_RESOURCE),
            error_text,
            has_error,
            details_text: string_or(raw.details.as_ref(), ""),
        })
    }

    /// Whether this finding carries both an error and remediation text.
    pub fn is_actionable(&self) -> bool {
        self.has_error && !self.details_text.trim().is_empty()
    }
}

fn string_or(value: Option<&Value>, default: &str) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        _ => default.to_string(),
    }
}

fn decode_error(error: Option<&Value>) -> (bool, String) {
    match error {
        Some(Value::Array(items)) if !items.is_empty() => (true, error_record_text(&items[0])),
        Some(record @ Value::Object(map)) if !map.is_empty() => (true, error_record_text(record)),
        Some(Value::String(s)) if !s.is_empty() => (true, s.clone()),
        _ => (false, UNKNOWN_ERROR.to_string()),
    }
}

fn error_record_text(record: &Value) -> String {
    record
        .get("Text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
}
