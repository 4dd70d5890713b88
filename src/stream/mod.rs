//! Streaming reassembly engine.
//!
//! Upstream bytes flow through three request-scoped stages:
//! [`SseParser`] (frames), [`DeltaDecoder`] (logical deltas), and
//! [`ChannelMux`] (reasoning markers). [`RelayPipeline`] owns all three and
//! is the single parsing path shared by the streaming and aggregating
//! output adapters.

pub mod delta;
pub mod mux;
pub mod sse;

pub use delta::{DecodeStats, DeltaDecoder, LogicalDelta};
pub use mux::{ChannelMux, MuxOutput, DEFAULT_FINISH_REASON, REASONING_CLOSE, REASONING_OPEN};
pub use sse::{SseParser, SsePayload};

use crate::util::{synthesized_completion_id, unix_now_secs};

/// Identifier and timestamp stamped on every outbound envelope.
///
/// Starts from synthesized values and is overwritten by any non-empty id
/// or non-zero timestamp the upstream reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMeta {
    pub id: String,
    pub created: u64,
}

impl StreamMeta {
    #[must_use]
    pub fn new(id: String, created: u64) -> Self {
        Self { id, created }
    }

    /// `chatcmpl-<nanos>` and the current Unix time.
    #[must_use]
    pub fn synthesized() -> Self {
        Self::new(synthesized_completion_id(), unix_now_secs())
    }

    pub fn observe(&mut self, id: Option<&str>, created: Option<u64>) {
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            if self.id != id {
                self.id.clear();
                self.id.push_str(id);
            }
        }
        if let Some(created) = created.filter(|created| *created != 0) {
            self.created = created;
        }
    }
}

/// Request-scoped relay context: frame reader, decoder, multiplexer, and
/// sticky metadata.
pub struct RelayPipeline {
    parser: SseParser,
    decoder: DeltaDecoder,
    mux: ChannelMux,
    meta: StreamMeta,
    payloads: Vec<SsePayload>,
    upstream_done: bool,
}

impl RelayPipeline {
    #[must_use]
    pub fn new(meta: StreamMeta) -> Self {
        Self {
            parser: SseParser::new(),
            decoder: DeltaDecoder::new(),
            mux: ChannelMux::new(),
            meta,
            payloads: Vec::with_capacity(8),
            upstream_done: false,
        }
    }

    /// Feed one upstream chunk, appending annotated outputs to `out`.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<MuxOutput>) {
        if self.upstream_done {
            return;
        }
        self.parser.feed_bytes_into(chunk, &mut self.payloads);
        self.drain_payloads(out);
    }

    /// The upstream byte stream ended. Flushes buffered state and closes
    /// the logical stream.
    pub fn finish(&mut self, out: &mut Vec<MuxOutput>) {
        if !self.upstream_done {
            self.parser.finish_into(&mut self.payloads);
            self.drain_payloads(out);
        }
        self.upstream_done = true;
        self.mux.end_of_stream(out);
    }

    /// True once the `[DONE]` sentinel or end of stream has been processed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.upstream_done
    }

    /// True once at least one upstream event has been accepted.
    #[must_use]
    pub fn has_accepted_event(&self) -> bool {
        self.decoder.stats().accepted > 0
    }

    #[must_use]
    pub fn meta(&self) -> &StreamMeta {
        &self.meta
    }

    #[must_use]
    pub fn stats(&self) -> DecodeStats {
        self.decoder.stats()
    }

    #[must_use]
    pub fn in_reasoning(&self) -> bool {
        self.mux.in_reasoning()
    }

    fn drain_payloads(&mut self, out: &mut Vec<MuxOutput>) {
        for payload in self.payloads.drain(..) {
            if self.upstream_done {
                continue;
            }
            match payload {
                SsePayload::Done => {
                    self.upstream_done = true;
                    self.mux.end_of_stream(out);
                }
                SsePayload::Data(data) => {
                    if let Some(deltas) = self.decoder.decode(&data, &mut self.meta) {
                        for delta in deltas {
                            self.mux.push(delta, out);
                        }
                    }
                }
            }
        }
    }
}

/// Run a complete upstream body through a fresh pipeline. Used by tests and
/// benches to compare adapters on identical input.
#[must_use]
pub fn collect_outputs<'a, I>(chunks: I, meta: StreamMeta) -> (Vec<MuxOutput>, StreamMeta)
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut pipeline = RelayPipeline::new(meta);
    let mut out = Vec::new();
    for chunk in chunks {
        pipeline.feed(chunk, &mut out);
        if pipeline.is_complete() {
            break;
        }
    }
    pipeline.finish(&mut out);
    (out, pipeline.meta)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKED_EXAMPLE: &str = concat!(
        "data: {\"id\":\"gen-1\",\"created\":1700000000,\"choices\":[{\"delta\":{\"reasoning\":\"he\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"reasoning\":\"llo\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"world\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );

    fn text_of(outputs: &[MuxOutput]) -> String {
        outputs
            .iter()
            .filter_map(|output| match output {
                MuxOutput::Text(text) => Some(text.as_str()),
                MuxOutput::Finish(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_worked_example() {
        let (out, meta) = collect_outputs(
            [WORKED_EXAMPLE.as_bytes()],
            StreamMeta::new("chatcmpl-0".into(), 1),
        );
        assert_eq!(text_of(&out), "<think>hello</think>world");
        assert_eq!(out.last(), Some(&MuxOutput::Finish("stop".into())));
        assert_eq!(meta.id, "gen-1");
        assert_eq!(meta.created, 1_700_000_000);
    }

    #[test]
    fn test_done_stops_further_processing() {
        let mut pipeline = RelayPipeline::new(StreamMeta::new("x".into(), 1));
        let mut out = Vec::new();
        pipeline.feed(
            b"data: {\"choices\":[{\"delta\":{\"reasoning\":\"r\"}}]}\n\ndata: [DONE]\n\n",
            &mut out,
        );
        assert!(pipeline.is_complete());
        pipeline.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n", &mut out);
        pipeline.finish(&mut out);
        assert_eq!(
            out,
            vec![
                MuxOutput::Text("<think>r".into()),
                MuxOutput::Text("</think>".into()),
                MuxOutput::Finish("stop".into()),
            ]
        );
    }

    #[test]
    fn test_noise_between_events_is_skipped() {
        let input = concat!(
            ": connected\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n",
            "data: {oops\n\n",
            "data: {\"usage\":{}}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n",
        );
        let mut pipeline = RelayPipeline::new(StreamMeta::new("x".into(), 1));
        let mut out = Vec::new();
        pipeline.feed(input.as_bytes(), &mut out);
        pipeline.finish(&mut out);
        assert_eq!(text_of(&out), "ab");
        let stats = pipeline.stats();
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.without_choice, 1);
    }

    #[test]
    fn test_unterminated_last_event_is_flushed() {
        let input = "data: {\"choices\":[{\"delta\":{\"reasoning\":\"r\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"c\"}}]}";
        let (out, _) = collect_outputs([input.as_bytes()], StreamMeta::new("x".into(), 1));
        assert_eq!(text_of(&out), "<think>r</think>c");
        assert_eq!(out.last(), Some(&MuxOutput::Finish("stop".into())));
    }

    #[test]
    fn test_complete_line_produces_output_immediately() {
        let mut pipeline = RelayPipeline::new(StreamMeta::new("x".into(), 1));
        let mut out = Vec::new();
        pipeline.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n", &mut out);
        assert_eq!(out, vec![MuxOutput::Text("a".into())]);
    }

    #[test]
    fn test_single_newline_noise_line_keeps_later_events() {
        let input = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            "data: ping\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"c\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"length\"}]}\n",
            "data: [DONE]\n",
        );
        let mut pipeline = RelayPipeline::new(StreamMeta::new("x".into(), 1));
        let mut out = Vec::new();
        pipeline.feed(input.as_bytes(), &mut out);
        assert!(pipeline.is_complete());
        pipeline.finish(&mut out);
        assert_eq!(text_of(&out), "abc");
        assert_eq!(out.last(), Some(&MuxOutput::Finish("length".into())));
        assert_eq!(pipeline.stats().malformed, 1);
    }

    #[test]
    fn test_byte_by_byte_matches_whole() {
        let (whole, _) = collect_outputs([WORKED_EXAMPLE.as_bytes()], StreamMeta::new("x".into(), 1));
        let (split, _) = collect_outputs(
            WORKED_EXAMPLE.as_bytes().chunks(1),
            StreamMeta::new("x".into(), 1),
        );
        assert_eq!(text_of(&whole), text_of(&split));
        assert_eq!(whole.last(), split.last());
    }

    #[test]
    fn test_meta_observe_ignores_empty_values() {
        let mut meta = StreamMeta::new("chatcmpl-1".into(), 5);
        meta.observe(Some(""), Some(0));
        assert_eq!(meta, StreamMeta::new("chatcmpl-1".into(), 5));
        meta.observe(Some("gen"), None);
        assert_eq!(meta, StreamMeta::new("gen".into(), 5));
    }

    #[test]
    fn test_synthesized_meta() {
        let meta = StreamMeta::synthesized();
        assert!(meta.id.starts_with("chatcmpl-"));
        assert!(meta.created > 0);
    }
}
