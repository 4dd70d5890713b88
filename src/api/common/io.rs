use std::time::Duration;

use bytes::Bytes;
use tokio::time::{timeout_at, Instant};

use crate::error::RelayError;
use crate::state::AppState;
use crate::util::truncate_for_log;

/// Client-facing message when the upstream rejects a request without a body.
pub(crate) const UPSTREAM_FAILED_MESSAGE: &str = "Target API request failed";

const MAX_UPSTREAM_ERROR_BYTES: usize = 500;

/// Send the upstream request and wait for a successful response head.
///
/// The timeout covers connection establishment and response headers only;
/// the body is returned unread. For a non-success status the error body is
/// read under the same deadline.
///
/// # Errors
///
/// - [`RelayError::Timeout`] when the deadline passes first.
/// - [`RelayError::Transport`] when the request cannot be sent.
/// - [`RelayError::Upstream`] carrying the upstream status and message.
pub(crate) async fn open_upstream_stream(
    state: &AppState,
    upstream_body: Bytes,
) -> Result<reqwest::Response, RelayError> {
    let timeout_secs = state.config.server.timeout;
    let deadline = Instant::now() + Duration::from_secs(timeout_secs);

    let response = timeout_at(
        deadline,
        state.transport.send_stream(&state.upstream, upstream_body),
    )
    .await
    .map_err(|_| RelayError::Timeout(timeout_secs))??;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body_bytes = match timeout_at(deadline, response.bytes()).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(err)) => {
            tracing::debug!(error = %err, "failed to read upstream error body");
            Bytes::new()
        }
        Err(_) => Bytes::new(),
    };
    Err(RelayError::Upstream {
        status: status.as_u16(),
        message: sanitize_upstream_error(&body_bytes),
    })
}

/// Extract a client-safe error message from an upstream error body.
///
/// Prefers the JSON `error.message` (or a string `error`/`message` field),
/// then the raw text truncated to 500 bytes, then a fixed fallback for
/// empty bodies.
pub(crate) fn sanitize_upstream_error(body: &[u8]) -> String {
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
        let message = json
            .get("error")
            .and_then(|error| error.get("message"))
            .and_then(serde_json::Value::as_str)
            .or_else(|| json.get("error").and_then(serde_json::Value::as_str))
            .or_else(|| json.get("message").and_then(serde_json::Value::as_str));
        if let Some(message) = message.filter(|message| !message.trim().is_empty()) {
            return truncated(message);
        }
    }

    let raw = String::from_utf8_lossy(body);
    let raw = raw.trim();
    if raw.is_empty() {
        return UPSTREAM_FAILED_MESSAGE.to_string();
    }
    truncated(raw)
}

fn truncated(message: &str) -> String {
    let cut = truncate_for_log(message, MAX_UPSTREAM_ERROR_BYTES);
    if cut.len() < message.len() {
        format!("{cut}...")
    } else {
        cut.to_string()
    }
}
