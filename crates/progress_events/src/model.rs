use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::phase::{EventType, Phase};

/// Canonical progress event exposed to consumers.
///
/// Instances are produced by [`crate::normalize`] and are never mutated afterwards. The
/// serialized form is strict: deserializing rejects unknown fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NormalizedProgressEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub intent_id: String,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ProgressMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StreamErrorInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactions: Option<Vec<TransactionDescriptor>>,
    pub timestamp: DateTime<Utc>,
}

impl NormalizedProgressEvent {
    pub fn is_terminal(&self) -> bool {
        self.event_type.is_terminal()
    }

    pub fn is_complete(&self) -> bool {
        self.event_type.is_complete()
    }

    pub fn is_error(&self) -> bool {
        self.event_type.is_error()
    }
}

/// Counters reported alongside progress. Absent fields mean "unknown", not zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProgressMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_strategies: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_strategies: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_protocols: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_protocols: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_breakdown: Option<Vec<ChainBreakdownEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressMetadata {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChainBreakdownEntry {
    pub name: String,
    pub chain_id: u64,
    pub protocol_count: u64,
}

/// An opaque transaction instruction emitted by the producer, passed through after validation.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TransactionDescriptor {
    pub to: String,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
}

impl TransactionDescriptor {
    pub fn new(to: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            data: data.into(),
            value: None,
            gas: None,
            gas_price: None,
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
            chain_id: None,
        }
    }
}

/// Error reported by the producer inside a progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}
