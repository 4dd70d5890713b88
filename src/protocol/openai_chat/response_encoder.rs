use crate::stream::StreamMeta;

use super::{
    OpenAiChatResponse, OpenAiChoice, OpenAiMessage, OpenAiModel, OpenAiModelList, OpenAiUsage,
    SYSTEM_FINGERPRINT,
};

/// Encode an aggregated completion as a `chat.completion` JSON body.
#[must_use]
pub fn encode_chat_response(
    meta: &StreamMeta,
    model: &str,
    content: &str,
    finish_reason: &str,
) -> Vec<u8> {
    let response = OpenAiChatResponse {
        id: &meta.id,
        object: "chat.completion",
        created: meta.created,
        model,
        choices: [OpenAiChoice {
            index: 0,
            message: OpenAiMessage {
                role: "assistant",
                content,
                refusal: None,
                annotations: [],
            },
            logprobs: None,
            finish_reason,
        }],
        usage: OpenAiUsage::default(),
        service_tier: "default",
        system_fingerprint: SYSTEM_FINGERPRINT,
    };
    serde_json::to_vec(&response).unwrap_or_default()
}

/// Encode the single-entry `/v1/models` listing.
#[must_use]
pub fn encode_model_list(model: &str, created: u64) -> Vec<u8> {
    let list = OpenAiModelList {
        object: "list",
        data: vec![OpenAiModel {
            id: model,
            object: "model",
            created,
            owned_by: "proxy",
        }],
    };
    serde_json::to_vec(&list).unwrap_or_default()
}
