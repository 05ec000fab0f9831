//! Alias-resolving normalization of raw progress payloads.
//!
//! Every field of the canonical model is resolved from an ordered list of candidate locations.
//! The first candidate that type-checks wins. Candidates that fail every alias leave the field
//! absent: a missing counter means "unknown", which is different from zero.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::model::{
    ChainBreakdownEntry, NormalizedProgressEvent, ProgressMetadata, StreamErrorInfo,
    TransactionDescriptor,
};
use crate::phase::{EventType, Phase};
use crate::raw::RawProgressPayload;

pub const DEFAULT_ERROR_CODE: &str = "STREAM_ERROR";
pub const DEFAULT_ERROR_MESSAGE: &str = "Stream reported an error";

/// Where a candidate value lives in the raw payload.
#[derive(Debug, Clone, Copy)]
enum Field {
    Top(&'static str),
    Meta(&'static str),
}

use Field::{Meta, Top};

const PHASE_FIELDS: &[Field] = &[
    Top("phase"),
    Top("currentStep"),
    Top("currentOperation"),
    Meta("phase"),
    Top("type"),
];

const TOTAL_STRATEGIES: &[Field] = &[
    Meta("totalStrategies"),
    Top("totalStrategies"),
    Top("strategyCount"),
    Meta("strategyCount"),
];
const PROCESSED_STRATEGIES: &[Field] = &[
    Meta("processedStrategies"),
    Top("processedStrategies"),
    Meta("strategiesProcessed"),
    Top("strategiesProcessed"),
];
const TOTAL_PROTOCOLS: &[Field] = &[
    Meta("totalProtocols"),
    Top("totalProtocols"),
    Top("protocolCount"),
    Meta("protocolCount"),
];
const PROCESSED_PROTOCOLS: &[Field] = &[
    Meta("processedProtocols"),
    Top("processedProtocols"),
    Meta("protocolsProcessed"),
    Top("protocolsProcessed"),
];
const ESTIMATED_DURATION: &[Field] = &[
    Meta("estimatedDuration"),
    Top("estimatedDuration"),
    Meta("estimatedTime"),
    Top("estimatedTime"),
];
const CHAIN_BREAKDOWN: &[Field] = &[
    Meta("chainBreakdown"),
    Top("chainBreakdown"),
    Meta("chains"),
    Top("chains"),
];
const MESSAGE: &[Field] = &[
    Meta("message"),
    Top("message"),
    Meta("description"),
    Top("statusMessage"),
];
const TRANSACTIONS: &[Field] = &[Top("transactions"), Top("txs"), Meta("transactions")];
const ENVELOPE_CHAIN_ID: &[Field] = &[Top("chainId"), Top("chain_id"), Meta("chainId")];

/// Normalizes a validated raw payload, using the current time when the payload carries none.
pub fn normalize(raw: &RawProgressPayload, intent_id: &str) -> NormalizedProgressEvent {
    normalize_at(raw, intent_id, Utc::now())
}

/// Like [`normalize`], with an explicit receive time for payloads without a usable timestamp.
pub fn normalize_at(
    raw: &RawProgressPayload,
    intent_id: &str,
    received_at: DateTime<Utc>,
) -> NormalizedProgressEvent {
    let event_type = resolve_event_type(raw);
    let current_step = resolve_phase(raw, event_type);
    let progress = resolve_progress(raw, event_type);
    let metadata = resolve_metadata(raw);
    let message = metadata.as_ref().and_then(|m| m.message.as_deref());
    let error = resolve_error(raw, event_type, message);
    let transactions = resolve_transactions(raw);

    NormalizedProgressEvent {
        event_type,
        intent_id: intent_id.to_string(),
        progress,
        current_step,
        metadata,
        error,
        transactions,
        timestamp: resolve_timestamp(raw, received_at),
    }
}

/// Maps any reported progress number into `[0, 1]`.
///
/// Fractions pass through; values above 1 are read as percentages; negatives become 0.
pub fn clamp_progress(value: f64) -> f64 {
    if value.is_nan() || value < 0.0 {
        0.0
    } else if value <= 1.0 {
        value
    } else {
        (value / 100.0).min(1.0)
    }
}

fn resolve_event_type(raw: &RawProgressPayload) -> EventType {
    raw.type_hint()
        .and_then(EventType::parse)
        .unwrap_or(EventType::Progress)
}

fn resolve_phase(raw: &RawProgressPayload, event_type: EventType) -> Option<Phase> {
    resolve(raw, PHASE_FIELDS, |value| value.as_str().and_then(Phase::parse)).or_else(|| {
        event_type
            .phase()
            .filter(|phase| phase.is_terminal())
    })
}

fn resolve_progress(raw: &RawProgressPayload, event_type: EventType) -> f64 {
    if event_type.is_complete() {
        return 1.0;
    }
    if let Some(reported) = lookup(raw, Top("progress")).and_then(as_number) {
        return clamp_progress(reported);
    }
    lookup(raw, Top("progressPercent"))
        .and_then(as_number)
        .map(percent_to_fraction)
        .unwrap_or(0.0)
}

/// A percent field is already on the 0-100 scale, so it saturates instead of being rescaled.
fn percent_to_fraction(percent: f64) -> f64 {
    if percent.is_nan() {
        0.0
    } else {
        (percent / 100.0).clamp(0.0, 1.0)
    }
}

fn resolve_metadata(raw: &RawProgressPayload) -> Option<ProgressMetadata> {
    let metadata = ProgressMetadata {
        total_strategies: resolve(raw, TOTAL_STRATEGIES, as_count),
        processed_strategies: resolve(raw, PROCESSED_STRATEGIES, as_count),
        total_protocols: resolve(raw, TOTAL_PROTOCOLS, as_count),
        processed_protocols: resolve(raw, PROCESSED_PROTOCOLS, as_count),
        estimated_duration: resolve(raw, ESTIMATED_DURATION, |value| {
            as_number(value).filter(|duration| *duration >= 0.0)
        }),
        chain_breakdown: resolve(raw, CHAIN_BREAKDOWN, chain_breakdown),
        message: resolve(raw, MESSAGE, as_text),
    };
    (!metadata.is_empty()).then_some(metadata)
}

fn chain_breakdown(value: &Value) -> Option<Vec<ChainBreakdownEntry>> {
    let entries: Vec<_> = value
        .as_array()?
        .iter()
        .filter_map(|entry| {
            let entry = entry.as_object()?;
            Some(ChainBreakdownEntry {
                name: first_of(entry, &["name", "chain"], as_text)?,
                chain_id: first_of(entry, &["chainId", "chain_id"], as_chain_id)?,
                protocol_count: first_of(entry, &["protocolCount", "protocols"], as_count)?,
            })
        })
        .collect();
    (!entries.is_empty()).then_some(entries)
}

fn resolve_transactions(raw: &RawProgressPayload) -> Option<Vec<TransactionDescriptor>> {
    let envelope_chain = resolve(raw, ENVELOPE_CHAIN_ID, as_chain_id);
    resolve(raw, TRANSACTIONS, |value| {
        let transactions: Vec<_> = value
            .as_array()?
            .iter()
            .filter_map(|entry| transaction(entry, envelope_chain))
            .collect();
        (!transactions.is_empty()).then_some(transactions)
    })
}

fn transaction(value: &Value, envelope_chain: Option<u64>) -> Option<TransactionDescriptor> {
    let entry = value.as_object()?;
    let field = |key: &str| entry.get(key).and_then(as_text);
    Some(TransactionDescriptor {
        to: entry.get("to").and_then(as_text)?,
        data: entry.get("data").and_then(as_text)?,
        value: field("value"),
        gas: field("gas"),
        gas_price: field("gasPrice"),
        max_fee_per_gas: field("maxFeePerGas"),
        max_priority_fee_per_gas: field("maxPriorityFeePerGas"),
        chain_id: entry
            .get("chainId")
            .and_then(as_chain_id)
            .or(envelope_chain),
    })
}

fn resolve_error(
    raw: &RawProgressPayload,
    event_type: EventType,
    message: Option<&str>,
) -> Option<StreamErrorInfo> {
    let fallback_code = || {
        lookup(raw, Top("errorCode"))
            .and_then(as_text)
            .unwrap_or_else(|| DEFAULT_ERROR_CODE.to_string())
    };

    match raw.get("error") {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(StreamErrorInfo {
            code: fallback_code(),
            message: text.trim().to_string(),
            details: None,
        }),
        Some(Value::Object(obj)) => Some(StreamErrorInfo {
            code: obj
                .get("code")
                .and_then(as_text)
                .unwrap_or_else(fallback_code),
            message: obj
                .get("message")
                .and_then(as_text)
                .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string()),
            details: obj.get("details").filter(|d| !d.is_null()).cloned(),
        }),
        _ if event_type.is_error() => Some(StreamErrorInfo {
            code: fallback_code(),
            message: message.unwrap_or(DEFAULT_ERROR_MESSAGE).to_string(),
            details: None,
        }),
        _ => None,
    }
}

fn resolve_timestamp(raw: &RawProgressPayload, received_at: DateTime<Utc>) -> DateTime<Utc> {
    let reported = match raw.get("timestamp") {
        Some(Value::String(text)) => DateTime::parse_from_rfc3339(text.trim())
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
        Some(Value::Number(millis)) => millis
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    };
    reported.unwrap_or(received_at)
}

fn lookup<'a>(raw: &'a RawProgressPayload, field: Field) -> Option<&'a Value> {
    match field {
        Top(key) => raw.get(key),
        Meta(key) => raw.get_nested(key),
    }
}

fn resolve<T>(
    raw: &RawProgressPayload,
    fields: &[Field],
    parse: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    fields
        .iter()
        .find_map(|field| lookup(raw, *field).and_then(&parse))
}

fn first_of<T>(
    entry: &Map<String, Value>,
    keys: &[&str],
    parse: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    keys.iter()
        .find_map(|key| entry.get(*key).and_then(&parse))
}

fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

fn as_count(value: &Value) -> Option<u64> {
    if let Some(count) = value.as_u64() {
        return Some(count);
    }
    let number = as_number(value)?;
    (number >= 0.0 && number.fract() == 0.0 && number <= u64::MAX as f64).then(|| number as u64)
}

fn as_chain_id(value: &Value) -> Option<u64> {
    let id = match value {
        Value::String(text) => {
            let text = text.trim();
            match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16).ok(),
                None => text.parse::<u64>().ok(),
            }
        }
        other => as_count(other),
    }?;
    (id > 0).then_some(id)
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => {
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
