//! Extraction Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An extraction error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The file could not be opened or read.
    #[display("unable to read document: {}", _0.display())]
    Read(#[error(not(source))] PathBuf),
    /// No registered extractor claims the file's extension.
    #[display("unsupported document format: {}", _0.display())]
    Unsupported(#[error(not(source))] PathBuf),
    /// The EPUB container is not a readable ZIP archive.
    #[display("malformed EPUB archive")]
    Archive,
    /// A required entry is missing from the EPUB container.
    #[display("missing EPUB entry: {_0}")]
    MissingEntry(#[error(not(source))] String),
    /// The PDF structure is too broken to load.
    #[display("malformed PDF document")]
    MalformedPdf,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Only reading can fail transiently; a broken document stays broken.
        matches!(self, Self::Read(_))
    }
}
