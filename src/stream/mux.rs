use super::delta::LogicalDelta;

/// Marker opening the reasoning channel inside the content stream.
pub const REASONING_OPEN: &str = "<think>";
/// Marker closing the reasoning channel inside the content stream.
pub const REASONING_CLOSE: &str = "</think>";
/// Finish reason reported when the upstream never sends one.
pub const DEFAULT_FINISH_REASON: &str = "stop";

/// Marker-annotated output of the channel multiplexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxOutput {
    /// Content text, possibly prefixed with an open or close marker.
    Text(String),
    /// Terminal output carrying the finish reason. Emitted exactly once.
    Finish(String),
}

/// Tracks whether the reasoning channel is open and keeps markers balanced.
#[derive(Debug, Default)]
pub struct ChannelMux {
    in_reasoning: bool,
    finished: bool,
}

impl ChannelMux {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn in_reasoning(&self) -> bool {
        self.in_reasoning
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Apply one delta, appending the resulting outputs to `out`.
    pub fn push(&mut self, delta: LogicalDelta, out: &mut Vec<MuxOutput>) {
        if self.finished {
            tracing::debug!(?delta, "dropping upstream delta after finish");
            return;
        }

        match delta {
            LogicalDelta::Reasoning(fragment) => {
                if self.in_reasoning {
                    out.push(MuxOutput::Text(fragment));
                } else {
                    self.in_reasoning = true;
                    out.push(MuxOutput::Text(prefixed(REASONING_OPEN, &fragment)));
                }
            }
            LogicalDelta::Content(fragment) => {
                if self.in_reasoning {
                    self.in_reasoning = false;
                    out.push(MuxOutput::Text(prefixed(REASONING_CLOSE, &fragment)));
                } else {
                    out.push(MuxOutput::Text(fragment));
                }
            }
            LogicalDelta::Finish(reason) => self.terminate(reason, out),
        }
    }

    /// The upstream ended. Closes an open reasoning channel and emits the
    /// default terminal output unless a finish reason was already seen.
    pub fn end_of_stream(&mut self, out: &mut Vec<MuxOutput>) {
        if !self.finished {
            self.terminate(DEFAULT_FINISH_REASON.to_string(), out);
        }
    }

    fn terminate(&mut self, reason: String, out: &mut Vec<MuxOutput>) {
        if self.in_reasoning {
            self.in_reasoning = false;
            out.push(MuxOutput::Text(REASONING_CLOSE.to_string()));
        }
        self.finished = true;
        out.push(MuxOutput::Finish(reason));
    }
}

fn prefixed(marker: &str, fragment: &str) -> String {
    let mut text = String::with_capacity(marker.len() + fragment.len());
    text.push_str(marker);
    text.push_str(fragment);
    text
}
