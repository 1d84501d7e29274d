//! Boundary tokens for multipart bodies

use crate::multipart::MultipartError;
use rand::Rng;
use std::sync::Arc;

/// Caller-pluggable boundary token generator
pub type BoundaryGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Length of the tokens produced by [`random_boundary`]
pub const BOUNDARY_TOKEN_LEN: usize = 29;

/// Dash prefix used when the caller does not supply one
pub const DEFAULT_DASH_PREFIX: &str = "-----------------------------";

/// Longest boundary RFC 2046 allows
pub const MAX_BOUNDARY_LEN: usize = 70;

const TSPECIALS: &str = "()<>@,;:\\\"/[]?=";

/// Generates a 29-digit numeric token whose first digit is never zero
///
/// Uses the thread-local RNG, so concurrent callers never share random state.
pub fn random_boundary() -> String {
    let mut rng = rand::rng();
    let mut token = String::with_capacity(BOUNDARY_TOKEN_LEN);
    token.push(char::from(b'0' + rng.random_range(1..=9u8)));
    for _ in 1..BOUNDARY_TOKEN_LEN {
        token.push(char::from(b'0' + rng.random_range(0..=9u8)));
    }
    token
}

/// Checks a full boundary (dash prefix plus token) against RFC 2046
///
/// A boundary is 1 to 70 characters from the `bchars` set and must not end
/// with a space.
pub fn validate_boundary(boundary: &str) -> Result<(), MultipartError> {
    if boundary.is_empty() || boundary.len() > MAX_BOUNDARY_LEN {
        return Err(MultipartError::InvalidBoundary(format!(
            "length must be between 1 and {}, got {}",
            MAX_BOUNDARY_LEN,
            boundary.len()
        )));
    }

    if let Some(c) = boundary.chars().find(|c| !is_bchar(*c)) {
        return Err(MultipartError::InvalidBoundary(format!(
            "'{}' contains the disallowed character {:?}",
            boundary, c
        )));
    }

    if boundary.ends_with(' ') {
        return Err(MultipartError::InvalidBoundary(format!(
            "'{}' ends with a space",
            boundary
        )));
    }

    Ok(())
}

fn is_bchar(c: char) -> bool {
    c.is_ascii_alphanumeric() || "'()+_,-./:=? ".contains(c)
}

/// Builds the `Content-Type` header value for a multipart body
///
/// The boundary is quoted if it contains an RFC 2045 tspecial or a space.
pub fn content_type_for(boundary: &str) -> String {
    if boundary.chars().any(|c| c == ' ' || TSPECIALS.contains(c)) {
        format!("multipart/form-data; boundary=\"{}\"", boundary)
    } else {
        format!("multipart/form-data; boundary={}", boundary)
    }
}
