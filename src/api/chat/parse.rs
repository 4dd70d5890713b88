use bytes::Bytes;
use serde_json::{Map, Value};

use crate::error::RelayError;

/// A validated client request, ready to forward.
#[derive(Debug)]
pub(crate) struct ChatRequest {
    /// False only when the client sent the JSON boolean `false`.
    pub(crate) stream: bool,
    pub(crate) upstream_body: Bytes,
    pub(crate) message_count: usize,
    pub(crate) client_model: Option<String>,
}

/// Validate a chat-completion body and build the upstream request body.
///
/// The upstream body is `{model: routing_model, messages, stream: true}`
/// plus every other client field verbatim.
///
/// # Errors
///
/// Returns [`RelayError::InvalidRequest`] when the body is not a JSON
/// object or `messages` is missing, not an array, or empty.
pub(crate) fn parse_chat_request(body: &[u8], routing_model: &str) -> Result<ChatRequest, RelayError> {
    let mut fields: Map<String, Value> = serde_json::from_slice(body).map_err(|e| {
        RelayError::InvalidRequest(format!("Invalid chat completion request body: {e}"))
    })?;

    let messages = match fields.remove("messages") {
        None | Some(Value::Null) => {
            return Err(RelayError::InvalidRequest(
                "'messages' is required".to_string(),
            ))
        }
        Some(Value::Array(messages)) if messages.is_empty() => {
            return Err(RelayError::InvalidRequest(
                "'messages' must be a non-empty array".to_string(),
            ))
        }
        Some(Value::Array(messages)) => messages,
        Some(_) => {
            return Err(RelayError::InvalidRequest(
                "'messages' must be an array".to_string(),
            ))
        }
    };

    let stream = !matches!(fields.remove("stream"), Some(Value::Bool(false)));
    let client_model = match fields.remove("model") {
        Some(Value::String(model)) => Some(model),
        _ => None,
    };
    let message_count = messages.len();

    let mut upstream = Map::with_capacity(fields.len() + 3);
    upstream.insert("model".to_string(), Value::String(routing_model.to_string()));
    upstream.insert("messages".to_string(), Value::Array(messages));
    upstream.insert("stream".to_string(), Value::Bool(true));
    upstream.extend(fields);

    let upstream_body = serde_json::to_vec(&upstream)
        .map_err(|e| RelayError::Internal(format!("Failed to encode upstream request: {e}")))?;

    Ok(ChatRequest {
        stream,
        upstream_body: Bytes::from(upstream_body),
        message_count,
        client_model,
    })
}
