//! HTTP transport collaborator
//!
//! The crawler hands a fully built request (method, URL, headers, body and
//! selected proxy) to a `Transport` and gets back status, headers and body, or
//! a `TransportError`. `ReqwestTransport` is the production implementation;
//! tests plug in their own.

mod reqwest_transport;

pub use reqwest_transport::{build_http_client, ReqwestTransport};

use crate::proxy::{ProxyAddress, ProxyDialError};
use crate::request::Request;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors reported by a transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Proxy dial failed: {0}")]
    Proxy(#[from] ProxyDialError),

    #[error("HTTP client error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Transport call cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns true if re-issuing the same request could succeed
    ///
    /// A request the HTTP client could not even build (a relative or
    /// unparseable URL, say) fails the same way every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cancelled => false,
            Self::Proxy(e) => !e.reason.is_addressing(),
            Self::Request(e) => !e.is_builder(),
            _ => true,
        }
    }
}

/// Raw reply from a transport
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Executes a single network attempt
///
/// Implementations must not retry on their own; retries are driven by the
/// crawler's retry policy.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        request: &Request,
        proxy: Option<&ProxyAddress>,
    ) -> Result<TransportResponse, TransportError>;
}
