//! Bounded conditional retry

use crate::request::{Request, Response};
use crate::transport::TransportError;
use std::fmt;
use std::sync::Arc;

/// Decides from a completed response whether the request should be re-issued
pub type RetryPredicate = Arc<dyn Fn(&Response) -> bool + Send + Sync>;

/// How many extra attempts a dispatch may make, and when
///
/// `max_retries` counts additional attempts, so a bound of 3 allows at most
/// four network calls. Once the bound is reached the last response is final
/// whatever the predicate says.
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    predicate: RetryPredicate,
}

impl RetryPolicy {
    /// Never retries
    pub fn none() -> Self {
        Self::new(0, Arc::new(|_: &Response| false))
    }

    pub fn new(max_retries: u32, predicate: RetryPredicate) -> Self {
        Self {
            max_retries,
            predicate,
        }
    }

    /// Retries non-2xx responses up to `max_retries` times
    pub fn with_count(max_retries: u32) -> Self {
        Self::new(max_retries, Arc::new(|response: &Response| !response.is_success()))
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn has_budget(&self, request: &Request) -> bool {
        request.number_of_retries() < self.max_retries
    }

    /// Returns true if `response` should be discarded and the request re-issued
    pub fn should_retry(&self, response: &Response) -> bool {
        self.has_budget(&response.request) && (self.predicate)(response)
    }

    /// Returns true if a failed attempt should be re-issued
    pub fn should_retry_error(&self, request: &Request, err: &TransportError) -> bool {
        self.has_budget(request) && err.is_retryable()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}
