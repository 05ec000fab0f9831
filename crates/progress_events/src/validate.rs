use serde_json::Value;

use crate::error::{CapturedRaw, ValidationError};
use crate::model::NormalizedProgressEvent;
use crate::raw::RawProgressPayload;

/// Parses a transport body and applies the open (loose) payload schema.
///
/// - Bodies that are not JSON fail with [`crate::ValidationErrorKind::Parse`].
/// - JSON that is not an object, or whose well-known fields have the wrong JSON type, fails with
///   [`crate::ValidationErrorKind::Schema`].
/// - Unknown fields are always tolerated.
pub fn validate_raw(body: &str) -> Result<RawProgressPayload, ValidationError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ValidationError::parse("payload is empty", body));
    }
    let value: Value = serde_json::from_str(body)
        .map_err(|err| ValidationError::parse(format!("payload is not JSON: {err}"), body))?;
    validate_raw_value(value)
}

pub fn validate_raw_value(value: Value) -> Result<RawProgressPayload, ValidationError> {
    let Value::Object(fields) = value else {
        let reason = format!("payload must be a JSON object, got {}", json_kind(&value));
        return Err(ValidationError::schema(reason, CapturedRaw::json(value)));
    };

    if let Some(reason) = loose_field_violation(&fields) {
        return Err(ValidationError::schema(
            reason,
            CapturedRaw::json(Value::Object(fields)),
        ));
    }

    Ok(RawProgressPayload::new(fields))
}

fn loose_field_violation(fields: &serde_json::Map<String, Value>) -> Option<String> {
    let present = |key: &str| fields.get(key).filter(|value| !value.is_null());

    if let Some(value) = present("type") {
        if !value.is_string() {
            return Some(format!("`type` must be a string, got {}", json_kind(value)));
        }
    }
    for key in ["progress", "progressPercent"] {
        if let Some(value) = present(key) {
            if !(value.is_number() || value.is_string()) {
                return Some(format!(
                    "`{key}` must be a number or string, got {}",
                    json_kind(value)
                ));
            }
        }
    }
    if let Some(value) = present("metadata") {
        if !value.is_object() {
            return Some(format!("`metadata` must be an object, got {}", json_kind(value)));
        }
    }
    if let Some(value) = present("transactions") {
        if !value.is_array() {
            return Some(format!(
                "`transactions` must be an array, got {}",
                json_kind(value)
            ));
        }
    }
    if let Some(value) = present("error") {
        if !(value.is_string() || value.is_object()) {
            return Some(format!(
                "`error` must be a string or object, got {}",
                json_kind(value)
            ));
        }
    }
    None
}

/// Applies the strict canonical checks to a normalized event.
pub fn validate_normalized(
    event: NormalizedProgressEvent,
) -> Result<NormalizedProgressEvent, ValidationError> {
    match strict_violation(&event) {
        None => Ok(event),
        Some(reason) => {
            let raw = serde_json::to_value(&event)
                .map(CapturedRaw::json)
                .unwrap_or_default();
            Err(ValidationError::schema(reason, raw))
        }
    }
}

/// Deserializes a canonical event (unknown fields rejected) and applies the strict checks.
pub fn validate_normalized_value(
    value: Value,
) -> Result<NormalizedProgressEvent, ValidationError> {
    let event: NormalizedProgressEvent = match serde_json::from_value(value.clone()) {
        Ok(event) => event,
        Err(err) => {
            return Err(ValidationError::schema(
                format!("not a canonical progress event: {err}"),
                CapturedRaw::json(value),
            ))
        }
    };
    validate_normalized(event)
}

fn strict_violation(event: &NormalizedProgressEvent) -> Option<String> {
    if event.intent_id.trim().is_empty() {
        return Some("`intentId` must not be empty".to_string());
    }
    if !event.progress.is_finite() || !(0.0..=1.0).contains(&event.progress) {
        return Some(format!("`progress` must be within [0, 1], got {}", event.progress));
    }
    if let Some(metadata) = &event.metadata {
        if let Some(duration) = metadata.estimated_duration {
            if !duration.is_finite() || duration < 0.0 {
                return Some(format!(
                    "`metadata.estimatedDuration` must be a non-negative number, got {duration}"
                ));
            }
        }
        for (idx, entry) in metadata.chain_breakdown.iter().flatten().enumerate() {
            if entry.name.trim().is_empty() {
                return Some(format!("`metadata.chainBreakdown[{idx}].name` must not be empty"));
            }
            if entry.chain_id == 0 {
                return Some(format!(
                    "`metadata.chainBreakdown[{idx}].chainId` must be a positive integer"
                ));
            }
        }
        if metadata.message.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Some("`metadata.message` must not be empty when present".to_string());
        }
    }
    if let Some(error) = &event.error {
        if error.code.trim().is_empty() || error.message.trim().is_empty() {
            return Some("`error.code` and `error.message` must not be empty".to_string());
        }
    }
    if let Some(transactions) = &event.transactions {
        if transactions.is_empty() {
            return Some("`transactions` must be omitted rather than empty".to_string());
        }
        for (idx, tx) in transactions.iter().enumerate() {
            if tx.to.trim().is_empty() || tx.data.trim().is_empty() {
                return Some(format!(
                    "`transactions[{idx}]` requires non-empty `to` and `data`"
                ));
            }
            if tx.chain_id == Some(0) {
                return Some(format!(
                    "`transactions[{idx}].chainId` must be a positive integer"
                ));
            }
        }
    }
    None
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

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::model::{ChainBreakdownEntry, ProgressMetadata, TransactionDescriptor};
    use crate::phase::EventType;
    use crate::ValidationErrorKind;

    fn event() -> NormalizedProgressEvent {
        NormalizedProgressEvent {
            event_type: EventType::Progress,
            intent_id: "intent-1".to_string(),
            progress: 0.5,
            current_step: None,
            metadata: None,
            error: None,
            transactions: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn non_json_bodies_are_parse_failures() {
        let err = validate_raw("event: ping").unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::Parse);
        assert_eq!(err.raw.text.as_deref(), Some("event: ping"));

        assert!(validate_raw("   ").unwrap_err().is_parse());
    }

    #[test]
    fn non_objects_and_mistyped_fields_are_schema_failures() {
        let err = validate_raw("[1, 2]").unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::Schema);
        assert_eq!(err.raw.json, Some(json!([1, 2])));

        for body in [
            r#"{"type": 3}"#,
            r#"{"progress": true}"#,
            r#"{"metadata": "x"}"#,
            r#"{"transactions": {"to": "0x1"}}"#,
            r#"{"error": 42}"#,
        ] {
            let err = validate_raw(body).unwrap_err();
            assert_eq!(err.kind, ValidationErrorKind::Schema, "{body}");
        }
    }

    #[test]
    fn open_schema_tolerates_unknown_and_null_fields() {
        let raw = validate_raw(
            r#"{"type": "parsing", "producerVersion": 7, "metadata": null, "error": null}"#,
        )
        .unwrap();
        assert_eq!(raw.type_hint(), Some("parsing"));
        assert!(raw.metadata().is_none());
        assert_eq!(raw.get("producerVersion"), Some(&json!(7)));
    }

    #[test]
    fn strict_checks_reject_out_of_range_values() {
        let mut bad = event();
        bad.progress = 1.5;
        assert!(validate_normalized(bad).is_err());

        let mut bad = event();
        bad.intent_id = " ".to_string();
        assert!(validate_normalized(bad).is_err());

        let mut bad = event();
        bad.metadata = Some(ProgressMetadata {
            chain_breakdown: Some(vec![ChainBreakdownEntry {
                name: "Ethereum".to_string(),
                chain_id: 0,
                protocol_count: 2,
            }]),
            ..ProgressMetadata::default()
        });
        assert!(validate_normalized(bad).is_err());

        let mut bad = event();
        bad.transactions = Some(Vec::new());
        assert!(validate_normalized(bad).is_err());

        let mut good = event();
        good.transactions = Some(vec![TransactionDescriptor::new("0xabc", "0x1")]);
        assert!(validate_normalized(good).is_ok());
    }

    #[test]
    fn canonical_values_reject_unknown_fields() {
        let mut value = serde_json::to_value(event()).unwrap();
        assert!(validate_normalized_value(value.clone()).is_ok());

        value["extra"] = json!(true);
        let err = validate_normalized_value(value).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::Schema);
        assert!(err.reason.contains("extra"), "{}", err.reason);
    }
}
