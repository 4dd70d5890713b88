use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::stream::DecodeStats;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
pub fn init_tracing(log_level: &str) {
    let Some(directive) = tracing_directive(log_level) else {
        return;
    };

    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn tracing_directive(log_level: &str) -> Option<String> {
    let level = log_level.to_uppercase();
    match level.as_str() {
        "DISABLED" => None,
        "WARNING" => Some("WARN".to_string()),
        "CRITICAL" => Some("ERROR".to_string()),
        _ => Some(level),
    }
}

/// Which output adapter served a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    Streaming,
    Aggregate,
}

impl RelayMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RelayMode::Streaming => "stream",
            RelayMode::Aggregate => "aggregate",
        }
    }
}

/// How the relaying phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    Completed,
    Cancelled,
    UpstreamFailed,
}

impl RelayEnd {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RelayEnd::Completed => "completed",
            RelayEnd::Cancelled => "client_disconnected",
            RelayEnd::UpstreamFailed => "upstream_read_failed",
        }
    }
}

/// End-of-request facts reported in one log line.
#[derive(Debug)]
pub struct RelaySummary<'a> {
    pub mode: RelayMode,
    pub end: RelayEnd,
    pub frames: u64,
    pub stats: DecodeStats,
    pub finish_reason: Option<&'a str>,
    pub elapsed: Duration,
}

/// Log the outcome of one relayed request, including decode noise counts.
pub fn log_relay_complete(summary: &RelaySummary<'_>) {
    let elapsed_ms = u64::try_from(summary.elapsed.as_millis()).unwrap_or(u64::MAX);
    match summary.end {
        RelayEnd::Completed => tracing::info!(
            mode = summary.mode.as_str(),
            outcome = summary.end.as_str(),
            frames = summary.frames,
            accepted_events = summary.stats.accepted,
            malformed_payloads = summary.stats.malformed,
            payloads_without_choice = summary.stats.without_choice,
            finish_reason = summary.finish_reason.unwrap_or("-"),
            elapsed_ms,
            "relay complete"
        ),
        RelayEnd::Cancelled | RelayEnd::UpstreamFailed => tracing::warn!(
            mode = summary.mode.as_str(),
            outcome = summary.end.as_str(),
            frames = summary.frames,
            accepted_events = summary.stats.accepted,
            malformed_payloads = summary.stats.malformed,
            payloads_without_choice = summary.stats.without_choice,
            elapsed_ms,
            "relay ended early"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_directive_mapping() {
        assert_eq!(tracing_directive("disabled"), None);
        assert_eq!(tracing_directive("WARNING").as_deref(), Some("WARN"));
        assert_eq!(tracing_directive("critical").as_deref(), Some("ERROR"));
        assert_eq!(tracing_directive("debug").as_deref(), Some("DEBUG"));
    }

    #[test]
    fn test_log_relay_complete_without_subscriber() {
        log_relay_complete(&RelaySummary {
            mode: RelayMode::Aggregate,
            end: RelayEnd::Completed,
            frames: 0,
            stats: DecodeStats::default(),
            finish_reason: Some("stop"),
            elapsed: Duration::from_millis(3),
        });
    }
}
