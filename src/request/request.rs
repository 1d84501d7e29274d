//! The request entity

use crate::crawler::Counters;
use crate::request::fingerprint::{body_digest, cache_key, SerializationError};
use crate::request::Context;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

/// Value of one entry in the field side-table a form body was encoded from
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    /// Path of the file the part was read from
    File(String),
}

/// A single outbound request and everything a dispatch needs to execute it
///
/// Requests built by a `Crawler` carry an ID that is unique for the lifetime of
/// that crawler. Hooks receive `&mut Request` and may rewrite the URL, headers,
/// body or proxy, or call [`Request::abort`] to cancel the dispatch.
#[derive(Debug, Default)]
pub struct Request {
    /// The URL to fetch
    pub url: String,

    /// HTTP method
    pub method: Method,

    /// Request headers
    pub headers: HeaderMap,

    /// Context shared with the resulting response
    pub ctx: Arc<Context>,

    /// Request body
    pub body: Vec<u8>,

    /// Unique identifier assigned by the crawler (0 when detached)
    pub id: u32,

    /// Proxy this request is routed through (`None` for a direct connection)
    pub proxy_url: Option<String>,

    /// Fields the body was built from, in append order, used for cache keys
    pub(crate) fields: Vec<(String, FieldValue)>,

    /// Digest of the body as encoded from `fields`
    form_digest: Option<[u8; 32]>,

    abort: bool,
    retry_counter: AtomicU32,
    counters: Weak<Counters>,
}

impl Request {
    /// Creates a detached request with a fresh context
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            ..Default::default()
        }
    }

    /// Binds this request to the counters of the crawler that issued it
    pub(crate) fn attach(&mut self, counters: &Arc<Counters>) {
        self.id = counters.next_request_id();
        self.counters = Arc::downgrade(counters);
    }

    /// Creates a follow-up request that shares this request's context
    ///
    /// The new request draws its ID from the same crawler. If that crawler has
    /// been dropped the follow-up is detached and its ID is 0.
    pub fn derive(&self, method: Method, url: impl Into<String>, body: Vec<u8>) -> Request {
        let mut next = Request {
            url: url.into(),
            method,
            body,
            ctx: Arc::clone(&self.ctx),
            ..Default::default()
        };
        if let Some(counters) = self.counters.upgrade() {
            next.attach(&counters);
        }
        next
    }

    /// Stops the dispatch: no network call is made and no after-response hook runs
    pub fn abort(&mut self) {
        self.abort = true;
    }

    pub fn is_aborted(&self) -> bool {
        self.abort
    }

    /// Sets a single header, replacing any existing value
    ///
    /// Names or values that are not valid HTTP tokens are skipped with a warning.
    pub fn set_header(&mut self, name: &str, value: &str) {
        let parsed = HeaderName::from_bytes(name.as_bytes())
            .ok()
            .zip(HeaderValue::from_str(value).ok());
        match parsed {
            Some((name, value)) => {
                self.headers.insert(name, value);
            }
            None => {
                tracing::warn!(request_id = self.id, "Skipping invalid header {}: {}", name, value);
            }
        }
    }

    /// Sets several headers at once
    pub fn set_headers<I, K, V>(&mut self, headers: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in headers {
            self.set_header(name.as_ref(), value.as_ref());
        }
    }

    pub fn set_content_type(&mut self, content_type: &str) {
        self.set_header(CONTENT_TYPE.as_str(), content_type);
    }

    /// Gets a header value as a string, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns how many times this request has been re-issued
    pub fn number_of_retries(&self) -> u32 {
        self.retry_counter.load(Ordering::SeqCst)
    }

    /// Records one more retry, returning the new count
    pub(crate) fn increment_retries(&self) -> u32 {
        self.retry_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the fields the body was built from (empty for raw bodies)
    ///
    /// Repeated names keep every value, in the order they were appended.
    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }

    /// Installs a body encoded from `fields`
    pub(crate) fn set_form_body(&mut self, fields: Vec<(String, FieldValue)>, body: Vec<u8>) {
        self.form_digest = Some(body_digest(&body));
        self.fields = fields;
        self.body = body;
    }

    /// Returns true if the body is still the one encoded from the field table
    ///
    /// False once a hook has rewritten the body.
    pub(crate) fn body_matches_fields(&self) -> bool {
        !self.fields.is_empty()
            && self
                .form_digest
                .is_some_and(|digest| digest == body_digest(&self.body))
    }

    /// Computes the content-addressed cache key for this request
    pub fn hash(&self) -> Result<String, SerializationError> {
        cache_key(self)
    }

    /// Resets every field to its empty state
    ///
    /// Buffers are cleared in place so their capacity is kept. The context is
    /// cleared in place only when nothing else holds it; otherwise it is
    /// replaced so a caller-held context is never wiped.
    pub(crate) fn reset(&mut self) {
        self.url.clear();
        self.method = Method::GET;
        self.headers.clear();
        match Arc::get_mut(&mut self.ctx) {
            Some(ctx) => ctx.clear(),
            None => self.ctx = Arc::default(),
        }
        self.body.clear();
        self.id = 0;
        self.proxy_url = None;
        self.fields.clear();
        self.form_digest = None;
        self.abort = false;
        *self.retry_counter.get_mut() = 0;
        self.counters = Weak::new();
    }
}
