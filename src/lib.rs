//! Predator: the request-execution core of a programmable web crawler
//!
//! This crate dispatches outbound HTTP(S) requests through an optional rotating
//! proxy pool, applies a bounded retry policy, runs before/after hooks around
//! each dispatch, derives stable cache keys from request content and recycles
//! request objects between dispatches.

pub mod cache;
pub mod config;
pub mod crawler;
pub mod multipart;
pub mod proxy;
pub mod request;
pub mod state;
pub mod transport;

use thiserror::Error;

/// Main error type for a single dispatch
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] proxy::ProxyDialError),

    #[error("Transport error for {url}: {source}")]
    Transport {
        url: String,
        source: transport::TransportError,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] request::SerializationError),

    #[error("Cache error: {0}")]
    Cache(#[from] cache::CacheError),

    #[error("Multipart error: {0}")]
    Multipart(#[from] multipart::MultipartError),

    #[error("Hook panicked while handling request {request_id}: {message}")]
    HookPanicked { request_id: u32, message: String },

    #[error("Dispatch cancelled for {url}")]
    Cancelled { url: String },
}

impl CrawlError {
    /// Returns true for faults in the caller's setup rather than the network
    ///
    /// Configuration-class errors are raised before any network attempt and
    /// are never retried.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Config(_) => true,
            Self::Proxy(e) => e.reason.is_addressing(),
            Self::Multipart(e) => matches!(e, multipart::MultipartError::InvalidBoundary(_)),
            _ => false,
        }
    }

    /// Returns true if the error came from the transport and could succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { source, .. } if source.is_retryable())
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("The proxy ip should contain the protocol: {0}")]
    InvalidProxy(String),

    #[error("Only support http, https and socks5 protocol, got: {0}")]
    UnknownProtocol(String),

    #[error("Proxy ip and port cannot be empty: {0}")]
    EmptyProxyHost(String),
}

/// Result type alias for dispatch operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use cache::{Cache, CachedResponse, MemoryCache, SqliteCache};
pub use config::Config;
pub use crawler::{Crawler, CrawlerBuilder, RetryPolicy};
pub use multipart::MultipartForm;
pub use proxy::{ProxyAddress, ProxyScheme, ProxySelector};
pub use request::{Context, FieldValue, Request, RequestPool, Response};
pub use state::DispatchState;
pub use transport::{ReqwestTransport, Transport, TransportError};
