//! Response cache collaborators
//!
//! This module handles caching of completed responses, keyed by the request
//! fingerprint:
//! - The `Cache` trait the crawler consults before dispatch
//! - An in-memory backend
//! - A SQLite backend that persists across runs

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;
pub use traits::{Cache, CacheError, CacheResult, CachedResponse};
