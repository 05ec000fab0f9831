use serde_json::Value;
use thiserror::Error;

/// Upper bound on raw text kept inside a [`ValidationError`].
const MAX_CAPTURED_TEXT_BYTES: usize = 4 * 1024;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ValidationErrorKind {
    /// The body was not structured data at all.
    Parse,
    /// The body was structured but failed field validation.
    Schema,
}

/// The offending payload, as far as it could be interpreted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturedRaw {
    pub text: Option<String>,
    pub json: Option<Value>,
}

impl CapturedRaw {
    pub(crate) fn text(body: &str) -> Self {
        Self {
            text: Some(truncate(body, MAX_CAPTURED_TEXT_BYTES).to_string()),
            json: None,
        }
    }

    pub(crate) fn json(value: Value) -> Self {
        Self {
            text: None,
            json: Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("progress payload rejected ({kind:?}): {reason}")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub reason: String,
    pub raw: CapturedRaw,
}

impl ValidationError {
    pub(crate) fn parse(reason: impl Into<String>, body: &str) -> Self {
        Self {
            kind: ValidationErrorKind::Parse,
            reason: reason.into(),
            raw: CapturedRaw::text(body),
        }
    }

    pub(crate) fn schema(reason: impl Into<String>, raw: CapturedRaw) -> Self {
        Self {
            kind: ValidationErrorKind::Schema,
            reason: reason.into(),
            raw,
        }
    }

    pub fn is_parse(&self) -> bool {
        self.kind == ValidationErrorKind::Parse
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum SseFrameError {
    #[error("invalid UTF-8 in event stream (line {line_number})")]
    InvalidUtf8 { line_number: usize },
    #[error("line too long (line={line_number}, observed_bytes={observed_bytes}, max_line_bytes={max_line_bytes})")]
    LineTooLong {
        line_number: usize,
        observed_bytes: usize,
        max_line_bytes: usize,
    },
    #[error("frame too large (line={line_number}, max_frame_bytes={max_frame_bytes})")]
    FrameTooLarge {
        line_number: usize,
        max_frame_bytes: usize,
    },
}

fn truncate(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
