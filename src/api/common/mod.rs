//! Upstream I/O and the two output adapters shared by the chat handler.

mod io;
mod non_streaming;
mod streaming;

pub(crate) use io::open_upstream_stream;
pub(crate) use non_streaming::{ok_json_response, relay_aggregate_response};
pub(crate) use streaming::relay_streaming_response;
