use axum::response::Response;
use bytes::Bytes;

use crate::api::common::ok_json_response;
use crate::protocol::openai_chat::response_encoder::encode_model_list;
use crate::state::AppState;
use crate::util::unix_now_secs;

/// List the single public model in `OpenAI` format.
#[must_use]
pub fn handler(state: &AppState) -> Response {
    let body = encode_model_list(state.public_model(), unix_now_secs());
    ok_json_response(Bytes::from(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::transport::{HttpTransport, PreparedUpstream};

    #[tokio::test]
    async fn test_handler_lists_public_model() {
        let config = AppConfig::default();
        let transport = HttpTransport::new(&config.server, &config.upstream);
        let upstream = PreparedUpstream::new(&config.upstream).unwrap();
        let state = AppState::new(config, transport, upstream);

        let response = handler(&state);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["object"], "list");
        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["id"], "unity");
        assert_eq!(data[0]["object"], "model");
        assert_eq!(data[0]["owned_by"], "proxy");
        assert!(data[0]["created"].as_u64().unwrap() > 0);
    }
}
