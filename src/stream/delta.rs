use smallvec::SmallVec;

use crate::protocol::upstream::{UpstreamChoice, UpstreamEvent};
use crate::util::truncate_for_log;

use super::StreamMeta;

const NOISE_PREVIEW_BYTES: usize = 120;

/// Normalized unit flowing from the decoder into the channel multiplexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalDelta {
    Reasoning(String),
    Content(String),
    Finish(String),
}

/// Deltas decoded from one upstream event, in processing order.
pub type DecodedDeltas = SmallVec<[LogicalDelta; 3]>;

/// Per-request decode counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Events that carried a choice and were applied.
    pub accepted: u64,
    /// Payloads that were not valid JSON of the expected shape.
    pub malformed: u64,
    /// Well-formed payloads with no `choices[0]`.
    pub without_choice: u64,
}

impl DecodeStats {
    #[must_use]
    pub fn noise(&self) -> u64 {
        self.malformed + self.without_choice
    }
}

/// Split one upstream choice into logical deltas.
///
/// A choice carrying several fields yields them in the fixed order
/// reasoning, content, finish. Empty fragments are dropped.
#[must_use]
pub fn deltas_from_choice(choice: UpstreamChoice) -> DecodedDeltas {
    let mut out = DecodedDeltas::new();
    if let Some(delta) = choice.delta {
        if let Some(reasoning) = delta.reasoning.filter(|text| !text.is_empty()) {
            out.push(LogicalDelta::Reasoning(reasoning));
        }
        if let Some(content) = delta.content.filter(|text| !text.is_empty()) {
            out.push(LogicalDelta::Content(content));
        }
    }
    if let Some(reason) = choice.finish_reason.filter(|reason| !reason.is_empty()) {
        out.push(LogicalDelta::Finish(reason));
    }
    out
}

/// Request-scoped payload decoder.
///
/// Malformed payloads are recovered locally: they are logged, counted, and
/// skipped. Sticky metadata is refreshed from every accepted event.
#[derive(Debug, Default)]
pub struct DeltaDecoder {
    stats: DecodeStats,
}

impl DeltaDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one non-sentinel payload.
    ///
    /// Returns `None` when the payload is noise.
    pub fn decode(&mut self, payload: &str, meta: &mut StreamMeta) -> Option<DecodedDeltas> {
        let event = match UpstreamEvent::parse(payload) {
            Ok(event) => event,
            Err(err) => {
                self.stats.malformed += 1;
                tracing::debug!(
                    error = %err,
                    payload = truncate_for_log(payload, NOISE_PREVIEW_BYTES),
                    "discarding malformed upstream payload"
                );
                return None;
            }
        };

        if event.first_choice().is_none() {
            self.stats.without_choice += 1;
            tracing::debug!(
                payload = truncate_for_log(payload, NOISE_PREVIEW_BYTES),
                "discarding upstream payload without a choice"
            );
            return None;
        }

        meta.observe(event.id.as_deref(), event.created);
        self.stats.accepted += 1;
        event.into_first_choice().map(deltas_from_choice)
    }

    #[must_use]
    pub fn stats(&self) -> DecodeStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> StreamMeta {
        StreamMeta::new("chatcmpl-local".to_string(), 1)
    }

    #[test]
    fn test_decode_reasoning_fragment() {
        let mut decoder = DeltaDecoder::new();
        let mut meta = meta();
        let deltas = decoder
            .decode(r#"{"choices":[{"delta":{"reasoning":"he"}}]}"#, &mut meta)
            .unwrap();
        assert_eq!(deltas.as_slice(), &[LogicalDelta::Reasoning("he".into())]);
        assert_eq!(decoder.stats().accepted, 1);
    }

    #[test]
    fn test_decode_orders_reasoning_before_content_and_finish() {
        let mut decoder = DeltaDecoder::new();
        let mut meta = meta();
        let deltas = decoder
            .decode(
                r#"{"choices":[{"delta":{"content":"b","reasoning":"a"},"finish_reason":"stop"}]}"#,
                &mut meta,
            )
            .unwrap();
        assert_eq!(
            deltas.as_slice(),
            &[
                LogicalDelta::Reasoning("a".into()),
                LogicalDelta::Content("b".into()),
                LogicalDelta::Finish("stop".into()),
            ]
        );
    }

    #[test]
    fn test_decode_drops_empty_fragments() {
        let mut decoder = DeltaDecoder::new();
        let mut meta = meta();
        let deltas = decoder
            .decode(
                r#"{"choices":[{"delta":{"role":"assistant","content":"","reasoning":""}}]}"#,
                &mut meta,
            )
            .unwrap();
        assert!(deltas.is_empty());
        assert_eq!(decoder.stats().accepted, 1);
    }

    #[test]
    fn test_decode_malformed_payload_is_counted_noise() {
        let mut decoder = DeltaDecoder::new();
        let mut meta = meta();
        assert!(decoder.decode("{not json", &mut meta).is_none());
        assert!(decoder.decode("heartbeat", &mut meta).is_none());
        assert_eq!(decoder.stats().malformed, 2);
        assert_eq!(decoder.stats().noise(), 2);
        assert_eq!(meta.id, "chatcmpl-local");
    }

    #[test]
    fn test_decode_without_choice_keeps_metadata() {
        let mut decoder = DeltaDecoder::new();
        let mut meta = meta();
        assert!(decoder
            .decode(r#"{"id":"gen-9","created":99,"choices":[]}"#, &mut meta)
            .is_none());
        assert_eq!(decoder.stats().without_choice, 1);
        assert_eq!(meta.id, "chatcmpl-local");
        assert_eq!(meta.created, 1);
    }

    #[test]
    fn test_decode_metadata_is_sticky() {
        let mut decoder = DeltaDecoder::new();
        let mut meta = meta();
        decoder.decode(
            r#"{"id":"gen-1","created":100,"choices":[{"delta":{"content":"a"}}]}"#,
            &mut meta,
        );
        assert_eq!((meta.id.as_str(), meta.created), ("gen-1", 100));

        decoder.decode(r#"{"choices":[{"delta":{"content":"b"}}]}"#, &mut meta);
        assert_eq!((meta.id.as_str(), meta.created), ("gen-1", 100));

        decoder.decode(
            r#"{"id":"","created":0,"choices":[{"delta":{"content":"c"}}]}"#,
            &mut meta,
        );
        assert_eq!((meta.id.as_str(), meta.created), ("gen-1", 100));

        decoder.decode(
            r#"{"id":"gen-2","created":200,"choices":[{"delta":{"content":"d"}}]}"#,
            &mut meta,
        );
        assert_eq!((meta.id.as_str(), meta.created), ("gen-2", 200));
    }
}
