//! `multipart/form-data` body construction

use crate::multipart::boundary::{
    content_type_for, random_boundary, validate_boundary, BoundaryGenerator,
};
use crate::multipart::sniff::{detect_content_type, SNIFF_LEN};
use crate::multipart::MultipartError;
use crate::request::FieldValue;
use std::path::Path;

/// Accumulates the parts of a multipart body
///
/// Each appended part is written straight into the body buffer as
/// `--boundary\r\n`, its headers, a blank line, the content and `\r\n`.
/// [`MultipartForm::finish`] writes the closing `--boundary--` line.
///
/// Alongside the wire bytes the form keeps a side-table of every part's name
/// and value (or file path), in append order, that the crawler uses to build
/// cache keys. Repeated names keep every entry.
///
/// # Example
///
/// ```
/// use predator_core::multipart::MultipartForm;
///
/// let mut form = MultipartForm::new("-------------------").unwrap();
/// form.append_string("id", "100").unwrap();
/// form.append_string("page", "1").unwrap();
/// assert!(form.content_type().starts_with("multipart/form-data; boundary="));
/// ```
#[derive(Debug)]
pub struct MultipartForm {
    buf: Vec<u8>,
    boundary: String,
    fields: Vec<(String, FieldValue)>,
    parts: usize,
}

impl MultipartForm {
    /// Creates a form whose boundary is `dash_prefix` plus a random 29-digit token
    pub fn new(dash_prefix: &str) -> Result<Self, MultipartError> {
        Self::with_boundary(format!("{}{}", dash_prefix, random_boundary()))
    }

    /// Creates a form whose boundary token comes from a caller-supplied generator
    ///
    /// Use this for deterministic boundaries. The generator output is validated
    /// together with the dash prefix.
    pub fn with_generator(
        dash_prefix: &str,
        generator: BoundaryGenerator,
    ) -> Result<Self, MultipartError> {
        Self::with_boundary(format!("{}{}", dash_prefix, generator()))
    }

    fn with_boundary(boundary: String) -> Result<Self, MultipartError> {
        validate_boundary(&boundary)?;
        Ok(Self {
            buf: Vec::new(),
            boundary,
            fields: Vec::new(),
            parts: 0,
        })
    }

    /// Appends a plain text field
    ///
    /// # Errors
    ///
    /// * `MultipartError::BoundaryCollision` - The value contains the boundary
    pub fn append_string(&mut self, name: &str, value: &str) -> Result<(), MultipartError> {
        self.write_part(name, None, value.as_bytes())?;
        self.fields
            .push((name.to_string(), FieldValue::Text(value.to_string())));
        Ok(())
    }

    /// Appends a file part read from `path`
    ///
    /// The part's `Content-Type` is sniffed from the first 512 bytes of the file.
    /// The side-table records the path rather than the file content.
    ///
    /// # Errors
    ///
    /// * `MultipartError::Io` - The file could not be read
    /// * `MultipartError::BoundaryCollision` - The file contains the boundary
    pub fn append_file(&mut self, name: &str, path: impl AsRef<Path>) -> Result<(), MultipartError> {
        let path = path.as_ref();
        let content = std::fs::read(path).map_err(|source| MultipartError::Io {
            name: name.to_string(),
            source,
        })?;
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.write_part(name, Some(&filename), &content)?;
        self.fields
            .push((name.to_string(), FieldValue::File(path.display().to_string())));
        Ok(())
    }

    fn write_part(
        &mut self,
        name: &str,
        filename: Option<&str>,
        content: &[u8],
    ) -> Result<(), MultipartError> {
        if contains(content, self.boundary.as_bytes()) {
            return Err(MultipartError::BoundaryCollision(name.to_string()));
        }

        self.buf.extend_from_slice(b"--");
        self.buf.extend_from_slice(self.boundary.as_bytes());
        self.buf.extend_from_slice(b"\r\n");

        let mut disposition = format!(
            "Content-Disposition: form-data; name=\"{}\"",
            escape_quotes(name)
        );
        if let Some(filename) = filename {
            disposition.push_str(&format!("; filename=\"{}\"", escape_quotes(filename)));
        }
        self.buf.extend_from_slice(disposition.as_bytes());
        self.buf.extend_from_slice(b"\r\n");

        if filename.is_some() {
            let sniffed = detect_content_type(&content[..content.len().min(SNIFF_LEN)]);
            self.buf
                .extend_from_slice(format!("Content-Type: {}\r\n", sniffed).as_bytes());
        }

        self.buf.extend_from_slice(b"\r\n");
        self.buf.extend_from_slice(content);
        self.buf.extend_from_slice(b"\r\n");
        self.parts += 1;
        Ok(())
    }

    /// The full boundary, dash prefix included
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// The `Content-Type` header value for this form
    pub fn content_type(&self) -> String {
        content_type_for(&self.boundary)
    }

    /// Name and value (or file path) of every appended part
    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }

    /// Number of parts written so far
    pub fn len(&self) -> usize {
        self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts == 0
    }

    /// Writes the terminator and returns the body, content type and side-table
    pub fn finish(mut self) -> (Vec<u8>, String, Vec<(String, FieldValue)>) {
        self.buf.extend_from_slice(b"--");
        self.buf.extend_from_slice(self.boundary.as_bytes());
        self.buf.extend_from_slice(b"--\r\n");
        let content_type = content_type_for(&self.boundary);
        (self.buf, content_type, self.fields)
    }
}

fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}
