//! Multipart form builder
//!
//! This module builds `multipart/form-data` request bodies:
//! - boundary token generation, validation and header quoting
//! - content-type sniffing for file parts
//! - the `MultipartForm` accumulation buffer

mod boundary;
mod form;
mod sniff;

pub use boundary::{
    content_type_for, random_boundary, validate_boundary, BoundaryGenerator, BOUNDARY_TOKEN_LEN,
    DEFAULT_DASH_PREFIX, MAX_BOUNDARY_LEN,
};
pub use form::MultipartForm;
pub use sniff::{detect_content_type, SNIFF_LEN};

use thiserror::Error;

/// Errors raised while building a multipart body
#[derive(Debug, Error)]
pub enum MultipartError {
    #[error("Invalid multipart boundary: {0}")]
    InvalidBoundary(String),

    #[error("Boundary appears inside the content of part '{0}'")]
    BoundaryCollision(String),

    #[error("Failed to read file part '{name}': {source}")]
    Io {
        name: String,
        source: std::io::Error,
    },
}
