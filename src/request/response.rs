//! The response entity

use crate::cache::CachedResponse;
use crate::request::{Context, Request};
use crate::transport::TransportResponse;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use std::borrow::Cow;
use std::sync::Arc;

/// The outcome of a completed dispatch
///
/// A response always owns the request that produced it and shares that
/// request's context.
#[derive(Debug)]
pub struct Response {
    /// HTTP status code
    pub status: StatusCode,

    /// Response headers
    pub headers: HeaderMap,

    /// Response body
    pub body: Vec<u8>,

    /// Context shared with the originating request
    pub ctx: Arc<Context>,

    /// The request that produced this response
    pub request: Request,

    /// Whether this response was served from the cache
    pub from_cache: bool,
}

impl Response {
    pub(crate) fn from_transport(raw: TransportResponse, request: Request) -> Self {
        Self {
            status: raw.status,
            headers: raw.headers,
            body: raw.body,
            ctx: Arc::clone(&request.ctx),
            request,
            from_cache: false,
        }
    }

    pub(crate) fn from_cached(cached: CachedResponse, request: Request) -> Self {
        let mut headers = HeaderMap::with_capacity(cached.headers.len());
        for (name, value) in &cached.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }

        Self {
            status: StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK),
            headers,
            body: cached.body,
            ctx: Arc::clone(&request.ctx),
            request,
            from_cache: true,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Returns true for 2xx statuses
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Gets a header value as a string, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Consumes the response and returns the originating request
    pub fn into_request(self) -> Request {
        self.request
    }
}
