use std::convert::Infallible;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use tokio::net::TcpListener;

const DEFAULT_UPSTREAM_PORT: u16 = 19_101;

type MockBody = UnsyncBoxBody<Bytes, Infallible>;

#[derive(Copy, Clone)]
enum MockScenario {
    /// Reasoning, then content, then a finish reason and `[DONE]`.
    Reasoning,
    /// Content only, no reasoning channel.
    Content,
    /// Stops mid-reasoning without a finish reason or `[DONE]`.
    Truncated,
    /// Rejects every request with a JSON error body.
    Error,
}

impl MockScenario {
    fn as_str(self) -> &'static str {
        match self {
            MockScenario::Reasoning => "reasoning",
            MockScenario::Content => "content",
            MockScenario::Truncated => "truncated",
            MockScenario::Error => "error",
        }
    }
}

struct MockState {
    scenario: MockScenario,
    event_delay: Duration,
    requests: AtomicU64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let port = env_u16("UPSTREAM_PORT", DEFAULT_UPSTREAM_PORT);
    let state = Arc::new(MockState {
        scenario: parse_scenario(),
        event_delay: Duration::from_millis(env_u64("MOCK_EVENT_DELAY_MS", 0)),
        requests: AtomicU64::new(0),
    });

    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap_or_else(|err| panic!("failed to bind mock upstream on 127.0.0.1:{port}: {err}"));
    eprintln!(
        "mock reasoning upstream on http://127.0.0.1:{port}/api/chat/ (scenario {})",
        state.scenario.as_str()
    );

    let conn_builder = AutoBuilder::new(TokioExecutor::new());
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok((stream, remote_addr)) => (stream, remote_addr),
            Err(err) => {
                eprintln!("accept error: {err}");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let conn_builder = conn_builder.clone();
        let service_state = Arc::clone(&state);
        let service = service_fn(move |request: Request<Incoming>| {
            let state_ref = Arc::clone(&service_state);
            async move { Ok::<_, Infallible>(handle_request(request, &state_ref).await) }
        });

        tokio::spawn(async move {
            if let Err(err) = conn_builder.serve_connection(io, service).await {
                eprintln!("mock upstream connection error from {remote_addr}: {err}");
            }
        });
    }
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_scenario() -> MockScenario {
    match env::var("MOCK_SCENARIO").as_deref() {
        Ok("content") => MockScenario::Content,
        Ok("truncated") => MockScenario::Truncated,
        Ok("error") => MockScenario::Error,
        Ok("reasoning") | Err(_) => MockScenario::Reasoning,
        Ok(other) => {
            eprintln!("unknown MOCK_SCENARIO '{other}', fallback to reasoning");
            MockScenario::Reasoning
        }
    }
}

async fn handle_request(request: Request<Incoming>, state: &Arc<MockState>) -> Response<MockBody> {
    let (parts, body) = request.into_parts();
    drain_request_body(body).await;

    let method = parts.method;
    let path = parts.uri.path();

    if method == Method::GET && path == "/_mock/stats" {
        let body = format!(
            "{{\"scenario\":\"{}\",\"requests\":{}}}",
            state.scenario.as_str(),
            state.requests.load(Ordering::Relaxed)
        );
        return full_response(StatusCode::OK, "application/json", Bytes::from(body));
    }
    if method != Method::POST {
        return full_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "application/json",
            Bytes::from_static(br#"{"error":"method_not_allowed"}"#),
        );
    }
    if path != "/api/chat/" && path != "/api/chat" {
        return full_response(
            StatusCode::NOT_FOUND,
            "application/json",
            Bytes::from_static(br#"{"error":"not_found"}"#),
        );
    }

    state.requests.fetch_add(1, Ordering::Relaxed);
    let events: &'static [&'static str] = match state.scenario {
        MockScenario::Reasoning => REASONING_EVENTS,
        MockScenario::Content => CONTENT_EVENTS,
        MockScenario::Truncated => TRUNCATED_EVENTS,
        MockScenario::Error => {
            return full_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "application/json",
                Bytes::from_static(br#"{"error":{"message":"mock_injected_error"}}"#),
            );
        }
    };
    event_stream_response(events, state.event_delay)
}

async fn drain_request_body(mut body: Incoming) {
    while let Some(frame_result) = body.frame().await {
        if frame_result.is_err() {
            break;
        }
    }
}

fn event_stream_response(events: &'static [&'static str], delay: Duration) -> Response<MockBody> {
    let frames = stream::unfold(events.iter(), move |mut remaining| async move {
        let event: &'static str = remaining.next().copied()?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let frame = Frame::data(Bytes::from_static(event.as_bytes()));
        Some((Ok::<_, Infallible>(frame), remaining))
    });

    let mut response = Response::new(BodyExt::boxed_unsync(StreamBody::new(frames)));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

fn full_response(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<MockBody> {
    let mut response = Response::new(BodyExt::boxed_unsync(Full::new(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

const REASONING_EVENTS: &[&str] = &[
    "data: {\"id\":\"gen-mock\",\"created\":1700000000,\"model\":\"x\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\",\"reasoning\":\"\"}}]}\n\n",
    ": OPENROUTER PROCESSING\n\n",
    "data: {\"id\":\"gen-mock\",\"created\":1700000000,\"model\":\"x\",\"choices\":[{\"index\":0,\"delta\":{\"reasoning\":\"The user\"}}]}\n\n",
    "data: {\"id\":\"gen-mock\",\"created\":1700000000,\"model\":\"x\",\"choices\":[{\"index\":0,\"delta\":{\"reasoning\":\" says hi.\"}}]}\n\n",
    "data: {\"id\":\"gen-mock\",\"created\":1700000000,\"model\":\"x\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hello\"}}]}\n\n",
    "data: {\"id\":\"gen-mock\",\"created\":1700000000,\"model\":\"x\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\" there!\"}}]}\n\n",
    "data: {\"id\":\"gen-mock\",\"created\":1700000000,\"model\":\"x\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
    "data: [DONE]\n\n",
];

const CONTENT_EVENTS: &[&str] = &[
    "data: {\"id\":\"gen-mock\",\"created\":1700000000,\"model\":\"x\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"o\"}}]}\n\n",
    "data: {\"id\":\"gen-mock\",\"created\":1700000000,\"model\":\"x\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"k\"},\"finish_reason\":\"stop\"}]}\n\n",
    "data: [DONE]\n\n",
];

const TRUNCATED_EVENTS: &[&str] = &[
    "data: {\"id\":\"gen-mock\",\"created\":1700000000,\"model\":\"x\",\"choices\":[{\"index\":0,\"delta\":{\"reasoning\":\"Still thinking\"}}]}\n\n",
    "data: {\"id\":\"gen-mock\",\"created\":1700000000,\"model\":\"x\",\"choices\":[{\"index\":0,\"delta\":{\"reasoning\":\" about it\"}}]}",
];
