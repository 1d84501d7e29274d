//! Cache trait and error types

use crate::request::Response;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache lock poisoned")]
    Poisoned,
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// A response as stored in a cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// HTTP status code
    pub status: u16,

    /// Header name/value pairs in wire order
    pub headers: Vec<(String, String)>,

    /// Response body
    pub body: Vec<u8>,

    /// When the entry was stored
    pub stored_at: DateTime<Utc>,
}

impl From<&Response> for CachedResponse {
    fn from(response: &Response) -> Self {
        Self {
            status: response.status.as_u16(),
            headers: response
                .headers
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect(),
            body: response.body.clone(),
            stored_at: Utc::now(),
        }
    }
}

/// Trait for cache backends
///
/// The key is the request fingerprint produced by
/// [`crate::request::cache_key`]. Implementations must be safe to share
/// between concurrent dispatches.
pub trait Cache: Send + Sync {
    /// Looks up a stored response
    fn get(&self, key: &str) -> CacheResult<Option<CachedResponse>>;

    /// Stores a response, replacing any previous entry under `key`
    fn set(&self, key: &str, response: &CachedResponse) -> CacheResult<()>;

    /// Removes every entry
    fn clear(&self) -> CacheResult<()>;

    /// Number of stored entries
    fn len(&self) -> CacheResult<usize>;

    fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }
}
