use tracing::debug;

use crate::config::DecodeLimits;
use crate::error::SseFrameError;

/// One dispatched server-sent event.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SseFrame {
    /// 1-based line number of the blank line that dispatched the frame.
    pub line_number: usize,
    /// The `event:` field, when the producer sent one.
    pub event: Option<String>,
    /// All `data:` lines of the frame joined with `\n`.
    pub data: String,
}

/// Incremental, bounded decoder for `text/event-stream` bodies.
///
/// Bytes are pushed as they arrive; complete frames come out in arrival order. Lines longer
/// than [`DecodeLimits::max_line_bytes`] are never buffered: the decoder switches to discard
/// mode until the next newline, reports the overflow, and drops the frame the line belonged to.
#[derive(Debug)]
pub struct SseDecoder {
    limits: DecodeLimits,
    current_line: Vec<u8>,
    observed_bytes: usize,
    discard_mode: bool,
    pending_too_long: bool,
    line_number: usize,
    frame: FrameState,
}

#[derive(Debug, Default)]
struct FrameState {
    event: Option<String>,
    data: Option<String>,
    poisoned: bool,
}

impl FrameState {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

impl SseDecoder {
    pub fn new(limits: DecodeLimits) -> Self {
        Self {
            limits,
            current_line: Vec::new(),
            observed_bytes: 0,
            discard_mode: false,
            pending_too_long: false,
            line_number: 0,
            frame: FrameState::default(),
        }
    }

    /// Feeds a chunk and returns every frame (or decode error) it completed.
    pub fn push(&mut self, mut chunk: &[u8]) -> Vec<Result<SseFrame, SseFrameError>> {
        let mut out = Vec::new();
        while !chunk.is_empty() {
            let Some(newline_idx) = chunk.iter().position(|b| *b == b'\n') else {
                self.observe_bytes(chunk.len());
                if !self.discard_mode {
                    self.current_line.extend_from_slice(chunk);
                }
                break;
            };

            self.observe_bytes(newline_idx);
            if !self.discard_mode {
                self.current_line.extend_from_slice(&chunk[..newline_idx]);
            }
            chunk = &chunk[newline_idx + 1..];
            if let Some(item) = self.finish_line() {
                out.push(item);
            }
        }
        out
    }

    /// Flushes a trailing unterminated line at end of stream.
    ///
    /// Per the event-stream format an incomplete frame (no blank line yet) is discarded.
    pub fn finish(&mut self) -> Option<SseFrameError> {
        let trailing = if self.pending_too_long || !self.current_line.is_empty() {
            self.finish_line().and_then(Result::err)
        } else {
            None
        };
        if self.frame.data.is_some() {
            debug!(line = self.line_number, "discarding unterminated event-stream frame");
        }
        self.frame.reset();
        trailing
    }

    fn observe_bytes(&mut self, additional: usize) {
        self.observed_bytes = self.observed_bytes.saturating_add(additional);
        if self.observed_bytes > self.limits.max_line_bytes && !self.discard_mode {
            self.discard_mode = true;
            self.pending_too_long = true;
            self.current_line.clear();
        }
    }

    fn reset_line_state(&mut self) {
        self.current_line.clear();
        self.observed_bytes = 0;
        self.discard_mode = false;
        self.pending_too_long = false;
    }

    fn finish_line(&mut self) -> Option<Result<SseFrame, SseFrameError>> {
        let line_number = self.line_number + 1;
        self.line_number = line_number;

        if self.pending_too_long {
            let observed_bytes = self.observed_bytes;
            self.reset_line_state();
            self.frame.poisoned = true;
            return Some(Err(SseFrameError::LineTooLong {
                line_number,
                observed_bytes,
                max_line_bytes: self.limits.max_line_bytes,
            }));
        }

        let bytes = std::mem::take(&mut self.current_line);
        self.reset_line_state();
        let Ok(line) = String::from_utf8(bytes) else {
            self.frame.poisoned = true;
            return Some(Err(SseFrameError::InvalidUtf8 { line_number }));
        };
        let line = line.strip_suffix('\r').unwrap_or(&line);

        if line.is_empty() {
            return self.dispatch(line_number);
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.append_data(value, line_number),
            "event" => {
                self.frame.event = Some(value.to_string());
                None
            }
            // `id` and `retry` steer browser reconnection; the tracker owns that policy.
            _ => None,
        }
    }

    fn append_data(
        &mut self,
        value: &str,
        line_number: usize,
    ) -> Option<Result<SseFrame, SseFrameError>> {
        if self.frame.poisoned {
            return None;
        }
        let data = self.frame.data.get_or_insert_with(String::new);
        let separator = usize::from(!data.is_empty());
        if data.len() + separator + value.len() > self.limits.max_frame_bytes {
            self.frame.poisoned = true;
            self.frame.data = None;
            return Some(Err(SseFrameError::FrameTooLarge {
                line_number,
                max_frame_bytes: self.limits.max_frame_bytes,
            }));
        }
        if separator == 1 {
            data.push('\n');
        }
        data.push_str(value);
        None
    }

    fn dispatch(&mut self, line_number: usize) -> Option<Result<SseFrame, SseFrameError>> {
        let frame = std::mem::take(&mut self.frame);
        if frame.poisoned {
            return None;
        }
        let data = frame.data?;
        Some(Ok(SseFrame {
            line_number,
            event: frame.event,
            data,
        }))
    }
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new(DecodeLimits::default())
    }
}
