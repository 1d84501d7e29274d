//! Free list of reusable request objects
//!
//! `acquire` hands out a uniquely owned `Request`; `release` consumes it, resets
//! it, and puts it back for the next dispatch. Ownership moves in both
//! directions, so a released request cannot be touched again by the caller.

use crate::request::Request;
use std::sync::{Mutex, PoisonError};

/// Default number of idle requests kept around
pub const DEFAULT_MAX_IDLE: usize = 256;

/// LIFO pool of `Request` objects
#[derive(Debug)]
pub struct RequestPool {
    free: Mutex<Vec<Request>>,
    max_idle: usize,
}

impl Default for RequestPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE)
    }
}

impl RequestPool {
    /// Creates a pool that keeps at most `max_idle` released requests
    pub fn new(max_idle: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    /// Takes the most recently released request, or allocates a new one
    pub fn acquire(&self) -> Request {
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default()
    }

    /// Resets `request` and returns it to the pool
    ///
    /// The body buffer is truncated rather than dropped, so its capacity is
    /// reused by the next `acquire`. Requests beyond `max_idle` are dropped.
    pub fn release(&self, mut request: Request) {
        request.reset();
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.max_idle {
            free.push(request);
        }
    }

    /// Number of idle requests waiting to be reused
    pub fn idle(&self) -> usize {
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
