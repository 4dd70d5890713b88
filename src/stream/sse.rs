/// SSE (Server-Sent Events) frame reader and encoding helpers.
///
/// Handles the low-level parsing of SSE payloads from a byte stream,
/// including buffering partial lines, partial UTF-8 sequences, and
/// single-newline-terminated `data:` lines.
use memchr::memchr_iter;
use serde::de::IgnoredAny;

const DONE_SENTINEL: &str = "[DONE]";
const DONE_FRAME: &str = "data: [DONE]\n\n";

/// One complete payload extracted from the upstream stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsePayload {
    /// A `data` payload, expected to be a JSON object.
    Data(String),
    /// The terminal `[DONE]` sentinel.
    Done,
}

// ---------------------------------------------------------------------------
// SseParser: incremental SSE line parser
// ---------------------------------------------------------------------------

/// Incremental SSE line parser.
///
/// Feed it raw bytes or text (potentially arriving in arbitrary
/// boundaries) and it yields fully-assembled [`SsePayload`]s.
pub struct SseParser {
    buffer: String,
    read_offset: usize,
    data_buffer: String,
    has_data: bool,
    utf8_remainder: Vec<u8>,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            read_offset: 0,
            data_buffer: String::new(),
            has_data: false,
            utf8_remainder: Vec::new(),
        }
    }

    /// Feed raw text and return any complete payloads parsed.
    ///
    /// Line rules:
    /// - `data:` lines append to the pending payload (one leading space
    ///   after the colon is stripped)
    /// - A payload is dispatched as soon as it is complete JSON or `[DONE]`,
    ///   without waiting for the blank line
    /// - A `data:` value that is complete on its own first flushes any
    ///   incomplete pending fragment; other values continue the fragment
    ///   as multi-line data joined with `\n`
    /// - An empty line dispatches whatever is pending
    /// - Lines starting with `:` are comments, ignored
    /// - `event:`, `id:`, `retry:` and unknown fields are ignored
    pub fn feed(&mut self, chunk: &str) -> Vec<SsePayload> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed raw text and append complete payloads into a caller-provided buffer.
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<SsePayload>) {
        self.buffer.push_str(chunk);
        let mut processed_up_to = self.read_offset;
        let bytes = self.buffer.as_bytes();
        let scan_start = processed_up_to;
        for rel_pos in memchr_iter(b'\n', &bytes[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let mut line = &self.buffer[processed_up_to..line_end];
            if let Some(stripped) = line.strip_suffix('\r') {
                line = stripped;
            }
            Self::process_line(line, &mut self.data_buffer, &mut self.has_data, out);
            processed_up_to = line_end + 1;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }

    /// Feed raw bytes. Incomplete UTF-8 sequences at the end of `bytes` are
    /// held back until the next call; invalid sequences decode as U+FFFD.
    pub fn feed_bytes_into(&mut self, bytes: &[u8], out: &mut Vec<SsePayload>) {
        if self.utf8_remainder.is_empty() {
            let tail = self.feed_utf8_prefix(bytes, out);
            self.utf8_remainder.extend_from_slice(tail);
            return;
        }

        let mut joined = std::mem::take(&mut self.utf8_remainder);
        joined.extend_from_slice(bytes);
        let tail_len = self.feed_utf8_prefix(&joined, out).len();
        let consumed = joined.len() - tail_len;
        joined.drain(..consumed);
        self.utf8_remainder = joined;
    }

    /// Flush end-of-stream state: an unterminated last line is processed
    /// and any pending payload is dispatched.
    pub fn finish_into(&mut self, out: &mut Vec<SsePayload>) {
        if !self.utf8_remainder.is_empty() {
            tracing::debug!(
                bytes = self.utf8_remainder.len(),
                "dropping incomplete UTF-8 sequence at end of stream"
            );
            self.utf8_remainder.clear();
        }

        if self.read_offset < self.buffer.len() {
            let tail = std::mem::take(&mut self.buffer);
            let line = &tail[self.read_offset..];
            let line = line.strip_suffix('\r').unwrap_or(line);
            Self::process_line(line, &mut self.data_buffer, &mut self.has_data, out);
        }
        self.buffer.clear();
        self.read_offset = 0;

        Self::dispatch(&mut self.data_buffer, &mut self.has_data, out);
    }

    /// Convenience wrapper over [`SseParser::finish_into`].
    pub fn finish(&mut self) -> Vec<SsePayload> {
        let mut out = Vec::new();
        self.finish_into(&mut out);
        out
    }

    fn feed_utf8_prefix<'b>(&mut self, bytes: &'b [u8], out: &mut Vec<SsePayload>) -> &'b [u8] {
        let mut rest = bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.feed_into(text, out);
                    return &[];
                }
                Err(err) => {
                    let (valid, tail) = rest.split_at(err.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        self.feed_into(text, out);
                    }
                    match err.error_len() {
                        Some(invalid_len) => {
                            self.feed_into("\u{FFFD}", out);
                            rest = &tail[invalid_len..];
                        }
                        None => return tail,
                    }
                }
            }
        }
    }

    fn process_line(
        line: &str,
        data_buffer: &mut String,
        has_data: &mut bool,
        out: &mut Vec<SsePayload>,
    ) {
        if line.is_empty() {
            Self::dispatch(data_buffer, has_data, out);
            return;
        }

        // Comment line
        if line.starts_with(':') {
            return;
        }

        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            if payload_is_complete(value) {
                // A self-contained value never continues an earlier fragment;
                // that fragment goes out on its own and fails decoding there.
                Self::dispatch(data_buffer, has_data, out);
                *has_data = true;
                data_buffer.push_str(value);
                Self::dispatch(data_buffer, has_data, out);
                return;
            }
            if *has_data {
                data_buffer.push('\n');
            }
            *has_data = true;
            data_buffer.push_str(value);
            if payload_is_complete(data_buffer) {
                Self::dispatch(data_buffer, has_data, out);
            }
        }
        // `event:`, `id:`, `retry:` and unknown fields carry nothing the
        // relay consumes.
    }

    fn dispatch(data_buffer: &mut String, has_data: &mut bool, out: &mut Vec<SsePayload>) {
        if !*has_data {
            return;
        }
        *has_data = false;
        let data = std::mem::take(data_buffer);
        let trimmed = data.trim();
        if trimmed.is_empty() {
            return;
        }
        if trimmed == DONE_SENTINEL {
            out.push(SsePayload::Done);
        } else {
            out.push(SsePayload::Data(data));
        }
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a pending payload already stands on its own.
fn payload_is_complete(data: &str) -> bool {
    let trimmed = data.trim();
    trimmed == DONE_SENTINEL
        || (!trimmed.is_empty() && serde_json::from_str::<IgnoredAny>(trimmed).is_ok())
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

/// Format an OpenAI-style SSE frame (no event type, just data).
#[must_use]
pub fn openai_sse_frame(json: &str) -> String {
    let mut out = String::with_capacity(10 + json.len());
    out.push_str("data: ");
    out.push_str(json);
    out.push_str("\n\n");
    out
}

/// The `[DONE]` frame as SSE text.
#[must_use]
pub fn done_frame() -> &'static str {
    DONE_FRAME
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn data(text: &str) -> SsePayload {
        SsePayload::Data(text.to_string())
    }

    #[test]
    fn test_parse_simple_data_frame() {
        let mut parser = SseParser::new();
        let payloads = parser.feed("data: {\"a\":1}\n\n");
        assert_eq!(payloads, vec![data("{\"a\":1}")]);
    }

    #[test]
    fn test_parse_multiple_frames() {
        let mut parser = SseParser::new();
        let payloads = parser.feed("data: {\"n\":1}\n\ndata: {\"n\":2}\n\n");
        assert_eq!(payloads, vec![data("{\"n\":1}"), data("{\"n\":2}")]);
    }

    #[test]
    fn test_parse_ignores_comments_and_other_fields() {
        let mut parser = SseParser::new();
        let payloads = parser.feed(": connected\nevent: message\nid: 7\nretry: 10\ndata: {}\n\n");
        assert_eq!(payloads, vec![data("{}")]);
    }

    #[test]
    fn test_parse_done_sentinel() {
        let mut parser = SseParser::new();
        assert_eq!(parser.feed("data: [DONE]\n\n"), vec![SsePayload::Done]);
        assert_eq!(parser.feed("data:  [DONE] \n\n"), vec![SsePayload::Done]);
    }

    #[test]
    fn test_parse_incremental_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed("data: {\"he").is_empty());
        assert!(parser.feed("llo\":1}").is_empty());
        assert_eq!(parser.feed("\n"), vec![data("{\"hello\":1}")]);
        assert!(parser.feed("\n").is_empty());
    }

    #[test]
    fn test_parse_single_newline_data_lines() {
        let mut parser = SseParser::new();
        let payloads = parser.feed("data: {\"n\":1}\ndata: {\"n\":2}\ndata: [DONE]\n");
        assert_eq!(
            payloads,
            vec![data("{\"n\":1}"), data("{\"n\":2}"), SsePayload::Done]
        );
        assert!(parser.finish().is_empty());
    }

    #[test]
    fn test_complete_line_is_dispatched_without_blank_line() {
        let mut parser = SseParser::new();
        assert_eq!(parser.feed("data: {\"n\":1}\n"), vec![data("{\"n\":1}")]);
        assert!(parser.feed("\n").is_empty());
    }

    #[test]
    fn test_noise_line_does_not_swallow_later_lines() {
        let mut parser = SseParser::new();
        let payloads = parser.feed("data: ping\ndata: {\"n\":1}\ndata: {\"n\":2}\ndata: [DONE]\n");
        assert_eq!(
            payloads,
            vec![
                data("ping"),
                data("{\"n\":1}"),
                data("{\"n\":2}"),
                SsePayload::Done,
            ]
        );
    }

    #[test]
    fn test_truncated_event_is_flushed_by_next_complete_line() {
        let mut parser = SseParser::new();
        let payloads = parser.feed("data: {\"cut\":\ndata: [DONE]\n");
        assert_eq!(payloads, vec![data("{\"cut\":"), SsePayload::Done]);
    }

    #[test]
    fn test_parse_multiline_json_is_joined() {
        let mut parser = SseParser::new();
        let payloads = parser.feed("data: {\"a\":\ndata: 1}\n\n");
        assert_eq!(payloads, vec![data("{\"a\":\n1}")]);
    }

    #[test]
    fn test_parse_crlf_line_endings() {
        let mut parser = SseParser::new();
        let payloads = parser.feed("data: {}\r\n\r\n");
        assert_eq!(payloads, vec![data("{}")]);
    }

    #[test]
    fn test_parse_empty_and_whitespace_input() {
        let mut parser = SseParser::new();
        assert!(parser.feed("").is_empty());
        assert!(parser.feed("   ").is_empty());
        assert!(parser.feed("\n\n\n").is_empty());
        assert!(parser.feed("data:\n\n").is_empty());
        assert!(parser.finish().is_empty());
    }

    #[test]
    fn test_finish_flushes_unterminated_payload() {
        let mut parser = SseParser::new();
        assert!(parser.feed("data: {\"tail\":true}").is_empty());
        assert_eq!(parser.finish(), vec![data("{\"tail\":true}")]);
        assert!(parser.finish().is_empty());
    }

    #[test]
    fn test_feed_bytes_split_utf8_sequence() {
        let mut parser = SseParser::new();
        let frame = "data: {\"c\":\"é\"}\n\n".as_bytes();
        let split = frame.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut out = Vec::new();
        parser.feed_bytes_into(&frame[..split], &mut out);
        assert!(out.is_empty());
        parser.feed_bytes_into(&frame[split..], &mut out);
        assert_eq!(out, vec![data("{\"c\":\"é\"}")]);
    }

    #[test]
    fn test_feed_bytes_invalid_utf8_is_replaced() {
        let mut parser = SseParser::new();
        let mut out = Vec::new();
        parser.feed_bytes_into(b"data: {\"c\":\"\xFF\"}\n\n", &mut out);
        assert_eq!(out, vec![data("{\"c\":\"\u{FFFD}\"}")]);
    }

    #[test]
    fn test_every_split_point_yields_same_payloads() {
        let input = ": connected\n\ndata: {\"n\":1}\n\ndata: {\"t\":\"ü\"}\ndata: [DONE]\n\n";
        let mut whole = SseParser::new();
        let mut expected = whole.feed(input);
        whole.finish_into(&mut expected);

        let bytes = input.as_bytes();
        for split in 0..=bytes.len() {
            let mut parser = SseParser::new();
            let mut out = Vec::new();
            parser.feed_bytes_into(&bytes[..split], &mut out);
            parser.feed_bytes_into(&bytes[split..], &mut out);
            parser.finish_into(&mut out);
            assert_eq!(out, expected, "split at {split}");
        }
    }

    // -- Encoding tests --

    #[test]
    fn test_done_frame_string() {
        assert_eq!(done_frame(), "data: [DONE]\n\n");
    }

    #[test]
    fn test_openai_sse_frame_helper() {
        let json = r#"{"id":"chatcmpl-1"}"#;
        assert_eq!(openai_sse_frame(json), "data: {\"id\":\"chatcmpl-1\"}\n\n");
    }
}
