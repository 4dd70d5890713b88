pub mod response_encoder;
pub mod stream;

use serde::Serialize;

/// `system_fingerprint` stamped on every outbound envelope.
pub const SYSTEM_FINGERPRINT: &str = "fp_proxy";

/// `OpenAI` Chat Completion stream chunk wire type (`chat.completion.chunk`).
#[derive(Debug, Clone, Serialize)]
pub struct OpenAiStreamChunk<'a> {
    pub id: &'a str,
    pub object: &'static str,
    pub created: u64,
    pub model: &'a str,
    pub system_fingerprint: &'static str,
    pub choices: [OpenAiStreamChoice<'a>; 1],
}

/// A single choice inside a stream chunk.
#[derive(Debug, Clone, Serialize)]
pub struct OpenAiStreamChoice<'a> {
    pub index: u32,
    pub delta: OpenAiStreamDelta<'a>,
    pub logprobs: Option<()>,
    pub finish_reason: Option<&'a str>,
}

/// Delta payload of a stream chunk. An all-`None` delta serializes as `{}`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OpenAiStreamDelta<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<&'a str>,
}

/// `OpenAI` Chat Completion response wire type (`chat.completion`).
#[derive(Debug, Clone, Serialize)]
pub struct OpenAiChatResponse<'a> {
    pub id: &'a str,
    pub object: &'static str,
    pub created: u64,
    pub model: &'a str,
    pub choices: [OpenAiChoice<'a>; 1],
    pub usage: OpenAiUsage,
    pub service_tier: &'static str,
    pub system_fingerprint: &'static str,
}

/// The single choice of an aggregated response.
#[derive(Debug, Clone, Serialize)]
pub struct OpenAiChoice<'a> {
    pub index: u32,
    pub message: OpenAiMessage<'a>,
    pub logprobs: Option<()>,
    pub finish_reason: &'a str,
}

/// Assistant message of an aggregated response.
#[derive(Debug, Clone, Serialize)]
pub struct OpenAiMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
    pub refusal: Option<()>,
    pub annotations: [(); 0],
}

/// Usage block. No token counting is performed, so every counter is zero.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OpenAiUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub prompt_tokens_details: OpenAiPromptTokensDetails,
    pub completion_tokens_details: OpenAiCompletionTokensDetails,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OpenAiPromptTokensDetails {
    pub cached_tokens: u64,
    pub audio_tokens: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OpenAiCompletionTokensDetails {
    pub reasoning_tokens: u64,
    pub audio_tokens: u64,
    pub accepted_prediction_tokens: u64,
    pub rejected_prediction_tokens: u64,
}

/// One entry of the `/v1/models` listing.
#[derive(Debug, Clone, Serialize)]
pub struct OpenAiModel<'a> {
    pub id: &'a str,
    pub object: &'static str,
    pub created: u64,
    pub owned_by: &'static str,
}

/// `/v1/models` response body.
#[derive(Debug, Clone, Serialize)]
pub struct OpenAiModelList<'a> {
    pub object: &'static str,
    pub data: Vec<OpenAiModel<'a>>,
}
