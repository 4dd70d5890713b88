//! `POST /v1/chat/completions`: validation, the upstream call, and adapter
//! selection.

pub(crate) mod parse;

use std::sync::Arc;
use std::time::Instant;

use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::api::common::{open_upstream_stream, relay_aggregate_response, relay_streaming_response};
use crate::state::AppState;
use crate::stream::{RelayPipeline, StreamMeta};

use self::parse::parse_chat_request;

/// Lifecycle of one chat-completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Validating,
    AwaitingUpstream,
    Relaying,
    Finalized,
}

#[derive(Debug)]
struct Session {
    phase: SessionPhase,
}

impl Session {
    fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
        }
    }

    fn advance(&mut self, next: SessionPhase) {
        tracing::debug!(from = ?self.phase, to = ?next, "session phase");
        self.phase = next;
    }
}

pub async fn handler(state: Arc<AppState>, body: Bytes) -> Response {
    let tag = state.next_request();
    let span = tracing::info_span!("chat_completion", seq = tag.seq, request_id = %tag.id);
    handle_chat(state, body).instrument(span).await
}

async fn handle_chat(state: Arc<AppState>, body: Bytes) -> Response {
    let started = Instant::now();
    let mut session = Session::new();

    session.advance(SessionPhase::Validating);
    let request = match parse_chat_request(&body, &state.config.upstream.routing_model) {
        Ok(request) => request,
        Err(err) => {
            tracing::info!(error = %err, "rejected chat request");
            session.advance(SessionPhase::Finalized);
            return err.into_response();
        }
    };
    tracing::debug!(
        stream = request.stream,
        messages = request.message_count,
        client_model = request.client_model.as_deref().unwrap_or("-"),
        "chat request accepted"
    );

    session.advance(SessionPhase::AwaitingUpstream);
    let upstream = match open_upstream_stream(&state, request.upstream_body).await {
        Ok(upstream) => upstream,
        Err(err) => {
            tracing::warn!(error = %err, "upstream request failed");
            session.advance(SessionPhase::Finalized);
            return err.into_response();
        }
    };

    session.advance(SessionPhase::Relaying);
    let pipeline = RelayPipeline::new(StreamMeta::synthesized());
    let model: Arc<str> = Arc::from(state.public_model());

    if request.stream {
        // The response body owns disconnect detection from here.
        let cancel = CancellationToken::new();
        return relay_streaming_response(upstream.bytes_stream(), pipeline, model, cancel, started);
    }

    // Dropping this future (client gone) cancels the spawned relay task.
    let response =
        relay_aggregate_response(upstream.bytes_stream(), pipeline, &model, started).await;
    session.advance(SessionPhase::Finalized);
    response
}
