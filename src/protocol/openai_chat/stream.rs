use bytes::Bytes;

use crate::stream::sse::openai_sse_frame;
use crate::stream::StreamMeta;

use super::{OpenAiStreamChoice, OpenAiStreamChunk, OpenAiStreamDelta, SYSTEM_FINGERPRINT};

const ASSISTANT_ROLE: &str = "assistant";

fn encode_chunk(
    meta: &StreamMeta,
    model: &str,
    delta: OpenAiStreamDelta<'_>,
    finish_reason: Option<&str>,
) -> Bytes {
    let chunk = OpenAiStreamChunk {
        id: &meta.id,
        object: "chat.completion.chunk",
        created: meta.created,
        model,
        system_fingerprint: SYSTEM_FINGERPRINT,
        choices: [OpenAiStreamChoice {
            index: 0,
            delta,
            logprobs: None,
            finish_reason,
        }],
    };
    // The chunk holds only strings and integers, so serialization cannot fail.
    let json = serde_json::to_string(&chunk).unwrap_or_default();
    Bytes::from(openai_sse_frame(&json))
}

/// Role announcement frame: `{"role":"assistant","content":""}`.
#[must_use]
pub fn role_frame(meta: &StreamMeta, model: &str) -> Bytes {
    encode_chunk(
        meta,
        model,
        OpenAiStreamDelta {
            role: Some(ASSISTANT_ROLE),
            content: Some(""),
        },
        None,
    )
}

/// Content frame carrying one annotated text fragment.
#[must_use]
pub fn content_frame(meta: &StreamMeta, model: &str, text: &str) -> Bytes {
    encode_chunk(
        meta,
        model,
        OpenAiStreamDelta {
            role: None,
            content: Some(text),
        },
        None,
    )
}

/// Terminal frame: empty delta plus the finish reason.
#[must_use]
pub fn finish_frame(meta: &StreamMeta, model: &str, finish_reason: &str) -> Bytes {
    encode_chunk(meta, model, OpenAiStreamDelta::default(), Some(finish_reason))
}
