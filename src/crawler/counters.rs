//! Atomic request/response counters

use std::sync::atomic::{AtomicU32, Ordering};

/// Per-crawler counters
///
/// The request counter doubles as the ID source, so IDs are unique for the
/// lifetime of a crawler. No ordering is implied between the two counters.
#[derive(Debug, Default)]
pub struct Counters {
    requests: AtomicU32,
    responses: AtomicU32,
}

impl Counters {
    /// Reserves the next request ID (IDs start at 1)
    pub fn next_request_id(&self) -> u32 {
        self.requests.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    pub(crate) fn record_response(&self) {
        self.responses.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of requests built so far
    pub fn requests(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }

    /// Number of transport responses received so far, retries included
    pub fn responses(&self) -> u32 {
        self.responses.load(Ordering::SeqCst)
    }
}
