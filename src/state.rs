mod request_id;

use std::time::Instant;

use crate::config::AppConfig;
use crate::transport::{HttpTransport, PreparedUpstream};

use request_id::RequestIds;
pub use request_id::RequestTag;

/// Shared application state accessible to all handlers. Immutable apart
/// from the request counter.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    pub upstream: PreparedUpstream,
    started_at: Instant,
    request_ids: RequestIds,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, transport: HttpTransport, upstream: PreparedUpstream) -> Self {
        Self {
            config,
            transport,
            upstream,
            started_at: Instant::now(),
            request_ids: RequestIds::new(),
        }
    }

    /// Tag the next inbound request for log correlation.
    pub fn next_request(&self) -> RequestTag {
        self.request_ids.issue()
    }

    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    #[must_use]
    pub fn public_model(&self) -> &str {
        &self.config.upstream.public_model
    }
}
