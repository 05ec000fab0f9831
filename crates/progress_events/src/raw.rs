use serde_json::{Map, Value};

/// An untrusted progress payload that passed the open schema check.
///
/// Only [`crate::validate_raw`] and [`crate::validate_raw_value`] construct it, so holders know
/// the payload is a JSON object whose well-known fields carry plausible JSON types.
#[derive(Debug, Clone, PartialEq)]
pub struct RawProgressPayload {
    fields: Map<String, Value>,
}

impl RawProgressPayload {
    pub(crate) fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|value| !value.is_null())
    }

    /// Nested `metadata` object, when present.
    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.get("metadata").and_then(Value::as_object)
    }

    pub fn get_nested(&self, key: &str) -> Option<&Value> {
        self.metadata()
            .and_then(|metadata| metadata.get(key))
            .filter(|value| !value.is_null())
    }

    /// The raw `type` hint, untouched.
    pub fn type_hint(&self) -> Option<&str> {
        self.get("type").and_then(Value::as_str)
    }
}
