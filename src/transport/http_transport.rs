use std::time::Duration;

use crate::config::{ServerConfig, UpstreamConfig};
use crate::error::RelayError;

use super::PreparedUpstream;

fn build_reqwest_client(
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    connect_timeout: Duration,
    proxy_url: Option<&str>,
) -> Result<reqwest::Client, RelayError> {
    // No overall request timeout: a relay may legitimately stream for minutes.
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(connect_timeout)
        .redirect(reqwest::redirect::Policy::none());

    if let Some(proxy_url) = proxy_url {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|err| RelayError::Transport(format!("Invalid proxy URL: {err}")))?;
        builder = builder.no_proxy().proxy(proxy);
    } else {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| RelayError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// Pooled HTTP client used for the single upstream call of each request.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with connection pooling from the server config and
    /// the optional upstream proxy.
    #[must_use]
    pub fn new(server: &ServerConfig, upstream: &UpstreamConfig) -> Self {
        let pool_idle_timeout = if server.http_pool_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(server.http_pool_idle_timeout_secs))
        };
        let proxy_url = upstream
            .proxy
            .as_deref()
            .map(str::trim)
            .filter(|proxy| !proxy.is_empty());

        let client = match build_reqwest_client(
            server.http_pool_max_idle_per_host.max(1),
            pool_idle_timeout,
            Duration::from_secs(server.timeout.max(1)),
            proxy_url,
        ) {
            Ok(client) => client,
            Err(err) => {
                tracing::error!(error = %err, "failed to build configured reqwest client, falling back to default client");
                reqwest::Client::new()
            }
        };
        Self { client }
    }

    /// POST `body` upstream and return once response headers arrive. The
    /// body is left unread for the caller to stream.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] when the connection or request fails.
    pub async fn send_stream(
        &self,
        upstream: &PreparedUpstream,
        body: bytes::Bytes,
    ) -> Result<reqwest::Response, RelayError> {
        let mut request = reqwest::Request::new(http::Method::POST, upstream.url().clone());
        *request.headers_mut() = upstream.headers().clone();
        *request.body_mut() = Some(reqwest::Body::from(body));

        self.client
            .execute(request)
            .await
            .map_err(|err| RelayError::Transport(err.to_string()))
    }
}
