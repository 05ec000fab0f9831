#![forbid(unsafe_code)]
//! Canonical progress events for asynchronous intent execution.
//!
//! Producers of intent progress have shipped several payload shapes over time. This crate is the
//! single place where those shapes are reconciled. It provides:
//! - An open validator for untrusted payloads ([`validate_raw`]) and a strict validator for the
//!   canonical model ([`validate_normalized`]).
//! - A deterministic alias-resolving normalizer ([`normalize`]).
//! - A bounded, incremental server-sent-events frame decoder ([`SseDecoder`]).

mod config;
mod error;
mod model;
mod normalize;
mod phase;
mod raw;
mod sse;
mod validate;

pub use config::DecodeLimits;
pub use error::{CapturedRaw, SseFrameError, ValidationError, ValidationErrorKind};
pub use model::{
    ChainBreakdownEntry, NormalizedProgressEvent, ProgressMetadata, StreamErrorInfo,
    TransactionDescriptor,
};
pub use normalize::{
    clamp_progress, normalize, normalize_at, DEFAULT_ERROR_CODE, DEFAULT_ERROR_MESSAGE,
};
pub use phase::{EventType, Phase};
pub use raw::RawProgressPayload;
pub use sse::{SseDecoder, SseFrame};
pub use validate::{validate_normalized, validate_normalized_value, validate_raw, validate_raw_value};
