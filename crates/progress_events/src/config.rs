/// Bounds applied while decoding a progress byte stream.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DecodeLimits {
    /// Longest single SSE line that is buffered; longer lines are discarded and reported.
    pub max_line_bytes: usize,
    /// Largest accumulated `data:` payload for one frame.
    pub max_frame_bytes: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_line_bytes: 64 * 1024,
            max_frame_bytes: 1024 * 1024,
        }
    }
}
