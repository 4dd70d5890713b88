use std::convert::Infallible;
use std::error::Error as _;
use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Method, Request};
use axum::response::{IntoResponse, Response};
use http_body_util::LengthLimitError;

use crate::api::{chat, health, models};
use crate::error::RelayError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteMatch {
    Health,
    Models,
    ChatCompletions,
    NotFound,
}

/// Dispatch a raw HTTP request to the matching handler.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let (parts, body) = request.into_parts();
    let route = match_route(&parts.method, parts.uri.path());

    let response = match route {
        RouteMatch::Health => health::health_handler(&state).into_response(),
        RouteMatch::Models => models::handler(&state),
        RouteMatch::ChatCompletions => {
            let limit = state.config.server.max_request_body_bytes;
            match read_request_body(body, limit).await {
                Ok(body_bytes) => chat::handler(state, body_bytes).await,
                Err(err) => err.into_response(),
            }
        }
        RouteMatch::NotFound => {
            tracing::debug!(method = %parts.method, path = parts.uri.path(), "no route");
            RelayError::NotFound(format!("{} {}", parts.method, parts.uri.path())).into_response()
        }
    };

    Ok(response)
}

/// Collect the request body, keeping the size limit apart from other read
/// failures such as a client aborting mid-upload.
async fn read_request_body(body: Body, limit: usize) -> Result<bytes::Bytes, RelayError> {
    body::to_bytes(body, limit).await.map_err(|err| {
        if exceeded_length_limit(&err) {
            RelayError::PayloadTooLarge(limit)
        } else {
            tracing::debug!(error = %err, "request body read failed");
            RelayError::InvalidRequest(format!("Failed to read request body: {err}"))
        }
    })
}

fn exceeded_length_limit(err: &axum::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if cause.is::<LengthLimitError>() {
            return true;
        }
        source = cause.source();
    }
    false
}

fn match_route(method: &Method, path: &str) -> RouteMatch {
    match path {
        "/health" if method == Method::GET => RouteMatch::Health,
        "/v1/models" if method == Method::GET => RouteMatch::Models,
        "/v1/chat/completions" if method == Method::POST => RouteMatch::ChatCompletions,
        _ => RouteMatch::NotFound,
    }
}
