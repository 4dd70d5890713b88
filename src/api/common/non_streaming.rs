use std::fmt::Display;
use std::time::Instant;

use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::RelayError;
use crate::observability::{log_relay_complete, RelayEnd, RelayMode, RelaySummary};
use crate::protocol::openai_chat::response_encoder::encode_chat_response;
use crate::stream::{DecodeStats, MuxOutput, RelayPipeline, StreamMeta, DEFAULT_FINISH_REASON};

/// Everything the upstream produced, folded into one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AggregatedCompletion {
    pub(crate) meta: StreamMeta,
    pub(crate) content: String,
    pub(crate) finish_reason: String,
    pub(crate) stats: DecodeStats,
}

#[inline]
pub(crate) fn ok_json_response(body_bytes: Bytes) -> Response {
    let mut response = Response::new(axum::body::Body::from(body_bytes));
    *response.status_mut() = http::StatusCode::OK;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}

/// Run the aggregating relay on its own task and answer with one
/// `chat.completion`.
///
/// If this future is dropped (the client went away) the relay task sees
/// the cancellation at its next upstream read, logs the outcome, and drops
/// the upstream body.
pub(crate) async fn relay_aggregate_response<S, E>(
    upstream: S,
    pipeline: RelayPipeline,
    model: &str,
    started: Instant,
) -> Response
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let cancel = CancellationToken::new();
    let _disconnect_guard = cancel.clone().drop_guard();

    let relay =
        tokio::spawn(aggregate_relay(upstream, pipeline, cancel, started).in_current_span());
    match relay.await {
        Ok(Ok(completion)) => aggregate_response(&completion, model),
        Ok(Err(err)) => err.into_response(),
        Err(join_err) => {
            RelayError::Internal(format!("aggregate relay task failed: {join_err}")).into_response()
        }
    }
}

/// Drive `pipeline` over the whole upstream body and concatenate every
/// text output.
///
/// # Errors
///
/// - [`RelayError::Internal`] when the upstream body fails before the
///   stream completes.
/// - [`RelayError::ClientClosed`] when `cancel` fires first.
pub(crate) async fn aggregate_relay<S, E>(
    upstream: S,
    mut pipeline: RelayPipeline,
    cancel: CancellationToken,
    started: Instant,
) -> Result<AggregatedCompletion, RelayError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let mut upstream = std::pin::pin!(upstream);
    let mut outputs: Vec<MuxOutput> = Vec::with_capacity(8);
    let mut content = String::new();
    let mut finish_reason: Option<String> = None;

    let end = loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break RelayEnd::Cancelled,
            next = upstream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => pipeline.feed(&chunk, &mut outputs),
            Some(Err(err)) => {
                tracing::warn!(error = %err, "upstream stream failed during aggregation");
                log_relay_complete(&RelaySummary {
                    mode: RelayMode::Aggregate,
                    end: RelayEnd::UpstreamFailed,
                    frames: 0,
                    stats: pipeline.stats(),
                    finish_reason: None,
                    elapsed: started.elapsed(),
                });
                return Err(RelayError::Internal(format!(
                    "Upstream stream failed: {err}"
                )));
            }
            None => pipeline.finish(&mut outputs),
        }

        for output in outputs.drain(..) {
            match output {
                MuxOutput::Text(text) => content.push_str(&text),
                MuxOutput::Finish(reason) => finish_reason = Some(reason),
            }
        }

        if pipeline.is_complete() {
            break RelayEnd::Completed;
        }
    };
    drop(upstream);

    log_relay_complete(&RelaySummary {
        mode: RelayMode::Aggregate,
        end,
        frames: u64::from(end == RelayEnd::Completed),
        stats: pipeline.stats(),
        finish_reason: finish_reason.as_deref(),
        elapsed: started.elapsed(),
    });

    if end == RelayEnd::Cancelled {
        tracing::debug!("client disconnected, upstream stream dropped");
        return Err(RelayError::ClientClosed);
    }
    Ok(AggregatedCompletion {
        meta: pipeline.meta().clone(),
        content,
        finish_reason: finish_reason.unwrap_or_else(|| DEFAULT_FINISH_REASON.to_string()),
        stats: pipeline.stats(),
    })
}

/// Encode an aggregated completion as the `200 OK` JSON response.
#[must_use]
pub(crate) fn aggregate_response(completion: &AggregatedCompletion, model: &str) -> Response {
    let body = encode_chat_response(
        &completion.meta,
        model,
        &completion.content,
        &completion.finish_reason,
    );
    ok_json_response(Bytes::from(body))
}
