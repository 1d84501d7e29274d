//! Cache-key canonicalization for requests
//!
//! A request is reduced to a canonical form (method, normalized URL, body media
//! type, and either its sorted field table or its raw body), serialized to
//! JSON, and hashed with SHA-256. The field table is sorted before encoding, so
//! insertion order never reaches the digest while repeated names keep every
//! value.

use crate::request::{FieldValue, Request};
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

/// Errors raised while canonicalizing a request
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("Cannot canonicalize URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("Cannot encode request: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct CanonicalRequest<'a> {
    method: &'a str,
    url: String,
    media_type: Option<String>,
    payload: Payload<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum Payload<'a> {
    Empty,
    Fields(Vec<&'a (String, FieldValue)>),
    Body(String),
}

/// Computes the hex-encoded SHA-256 cache key of a request
///
/// Requests whose body is still the one encoded from their field table (form
/// posts, multipart forms) are keyed by their fields, so a multipart body with
/// a random boundary still maps to a stable key. Once the body has been
/// rewritten, or when there is no field table, the raw body is keyed instead.
/// The `Content-Type` media type is always part of the key, without parameters
/// such as the multipart boundary.
///
/// # Returns
///
/// * `Ok(String)` - 64 hex characters
/// * `Err(SerializationError)` - The URL could not be parsed or the canonical form could not be encoded
pub fn cache_key(request: &Request) -> Result<String, SerializationError> {
    let url = Url::parse(&request.url).map_err(|source| SerializationError::InvalidUrl {
        url: request.url.clone(),
        source,
    })?;

    let payload = if request.body_matches_fields() {
        let mut fields: Vec<_> = request.fields().iter().collect();
        fields.sort();
        Payload::Fields(fields)
    } else if !request.body.is_empty() {
        Payload::Body(hex::encode(&request.body))
    } else {
        Payload::Empty
    };

    let canonical = CanonicalRequest {
        method: request.method.as_str(),
        url: url.to_string(),
        media_type: request.header(CONTENT_TYPE.as_str()).map(media_type),
        payload,
    };

    let bytes = serde_json::to_vec(&canonical)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 of a request body
pub(crate) fn body_digest(body: &[u8]) -> [u8; 32] {
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&Sha256::digest(body));
    digest
}

/// `multipart/form-data; boundary=x` -> `multipart/form-data`
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
