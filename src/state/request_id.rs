use std::sync::atomic::{AtomicU64, Ordering};

/// Log-correlation identity of one inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTag {
    /// 1-based arrival order within this process.
    pub seq: u64,
    pub id: uuid::Uuid,
}

/// Hands out request tags. The UUID is the arrival number mixed into a
/// random per-process seed, so ids do not repeat across restarts.
pub(crate) struct RequestIds {
    process_seed: u128,
    issued: AtomicU64,
}

impl RequestIds {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            process_seed: fastrand::u128(..),
            issued: AtomicU64::new(0),
        }
    }

    pub(crate) fn issue(&self) -> RequestTag {
        let seq = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        RequestTag {
            seq,
            id: uuid::Uuid::from_u128(self.process_seed ^ u128::from(seq)),
        }
    }
}
