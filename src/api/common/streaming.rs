use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;

use axum::response::Response;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::observability::{log_relay_complete, RelayEnd, RelayMode, RelaySummary};
use crate::protocol::openai_chat::stream::{content_frame, finish_frame, role_frame};
use crate::stream::sse::done_frame;
use crate::stream::{MuxOutput, RelayPipeline, StreamMeta};

const FRAME_CHANNEL_CAPACITY: usize = 16;

type FrameResult = Result<Bytes, std::io::Error>;

/// The client went away; no further frames can be delivered.
#[derive(Debug)]
struct Disconnected;

#[inline]
fn sse_ok_response(body: axum::body::Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    headers.insert("x-accel-buffering", http::HeaderValue::from_static("no"));
    response
}

/// Build the SSE response for a streaming relay.
///
/// A spawned producer drives `pipeline` over `upstream` and pushes encoded
/// frames through a bounded channel. Dropping the response body cancels
/// `cancel`, which stops the producer at its next read or send and drops
/// the upstream stream.
pub(crate) fn relay_streaming_response<S, E>(
    upstream: S,
    pipeline: RelayPipeline,
    model: Arc<str>,
    cancel: CancellationToken,
    started: Instant,
) -> Response
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<FrameResult>(FRAME_CHANNEL_CAPACITY);
    let disconnect_guard = cancel.clone().drop_guard();

    let writer = FrameWriter::new(tx, cancel, model);
    tokio::spawn(produce_frames(upstream, pipeline, writer, started).in_current_span());

    let body_stream = futures_util::stream::unfold(
        (rx, disconnect_guard),
        |(mut rx, disconnect_guard)| async move {
            rx.recv()
                .await
                .map(|frame| (frame, (rx, disconnect_guard)))
        },
    );
    sse_ok_response(axum::body::Body::from_stream(body_stream))
}

async fn produce_frames<S, E>(
    upstream: S,
    mut pipeline: RelayPipeline,
    mut writer: FrameWriter,
    started: Instant,
) where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: Display,
{
    let mut upstream = std::pin::pin!(upstream);
    let mut outputs: Vec<MuxOutput> = Vec::with_capacity(8);
    let cancel = writer.cancel.clone();

    let end = loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break RelayEnd::Cancelled,
            next = upstream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => pipeline.feed(&chunk, &mut outputs),
            Some(Err(err)) => {
                tracing::warn!(error = %err, "upstream stream failed mid-relay");
                // Best effort: the client may already be gone.
                let _ = writer
                    .send(Err(std::io::Error::other(format!(
                        "upstream stream failed: {err}"
                    ))))
                    .await;
                break RelayEnd::UpstreamFailed;
            }
            None => pipeline.finish(&mut outputs),
        }

        if writer
            .write_outputs(pipeline.meta(), pipeline.has_accepted_event(), &mut outputs)
            .await
            .is_err()
        {
            break RelayEnd::Cancelled;
        }

        if pipeline.is_complete() {
            if writer.write_done().await.is_err() {
                break RelayEnd::Cancelled;
            }
            break RelayEnd::Completed;
        }
    };
    drop(upstream);

    if end == RelayEnd::Cancelled {
        tracing::debug!("client disconnected, upstream stream dropped");
    }
    log_relay_complete(&RelaySummary {
        mode: RelayMode::Streaming,
        end,
        frames: writer.frames,
        stats: pipeline.stats(),
        finish_reason: writer.finish_reason.as_deref(),
        elapsed: started.elapsed(),
    });
}

/// Encodes multiplexer outputs as chunk frames, in order, exactly once each.
struct FrameWriter {
    tx: mpsc::Sender<FrameResult>,
    cancel: CancellationToken,
    model: Arc<str>,
    role_sent: bool,
    done_sent: bool,
    frames: u64,
    finish_reason: Option<String>,
}

impl FrameWriter {
    fn new(tx: mpsc::Sender<FrameResult>, cancel: CancellationToken, model: Arc<str>) -> Self {
        Self {
            tx,
            cancel,
            model,
            role_sent: false,
            done_sent: false,
            frames: 0,
            finish_reason: None,
        }
    }

    async fn send(&mut self, frame: FrameResult) -> Result<(), Disconnected> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Disconnected),
            sent = self.tx.send(frame) => sent.map_err(|_| Disconnected),
        }
    }

    async fn send_frame(&mut self, frame: Bytes) -> Result<(), Disconnected> {
        self.send(Ok(frame)).await?;
        self.frames += 1;
        Ok(())
    }

    /// Drain `outputs`. The role announcement goes out before anything else,
    /// as soon as an upstream event has been accepted or a terminal output
    /// is about to be written.
    async fn write_outputs(
        &mut self,
        meta: &StreamMeta,
        accepted_event: bool,
        outputs: &mut Vec<MuxOutput>,
    ) -> Result<(), Disconnected> {
        if !self.role_sent && (accepted_event || !outputs.is_empty()) {
            self.role_sent = true;
            let frame = role_frame(meta, &self.model);
            self.send_frame(frame).await?;
        }

        for output in outputs.drain(..) {
            let frame = match output {
                MuxOutput::Text(text) => content_frame(meta, &self.model, &text),
                MuxOutput::Finish(reason) => {
                    let frame = finish_frame(meta, &self.model, &reason);
                    self.finish_reason = Some(reason);
                    frame
                }
            };
            self.send_frame(frame).await?;
        }
        Ok(())
    }

    async fn write_done(&mut self) -> Result<(), Disconnected> {
        if self.done_sent {
            return Ok(());
        }
        self.done_sent = true;
        self.send_frame(Bytes::from_static(done_frame().as_bytes()))
            .await
    }
}
