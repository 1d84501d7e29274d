//! Request and response entities
//!
//! This module contains the objects that flow through a dispatch:
//! - `Context`, the key/value store shared by a request and its response
//! - `Request` and `Response`
//! - `RequestPool`, a free list that recycles request allocations
//! - cache-key canonicalization for requests

mod context;
mod fingerprint;
mod pool;
#[allow(clippy::module_inception)]
mod request;
mod response;

pub use context::Context;
pub use fingerprint::{cache_key, SerializationError};
pub use pool::{RequestPool, DEFAULT_MAX_IDLE};
pub use request::{FieldValue, Request};
pub use response::Response;
