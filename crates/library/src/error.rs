//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Most things that go wrong during a run are not errors at this level: a
//! document that fails to parse is logged and left out, a corrupt cache is
//! an empty cache, and a failed normalizer request leaves names as they are.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The library directory could not be listed.
    #[display("unable to read library directory: {}", _0.display())]
    Library(#[error(not(source))] PathBuf),
    /// A document's metadata could not be read. Never fails a run; the
    /// document is left out of the catalog.
    #[display("unable to extract metadata: {}", _0.display())]
    Extract(#[error(not(source))] PathBuf),
    /// A cache could not be written back to disk.
    #[display("unable to persist caches")]
    Persist,
    #[display("unable to resolve publishers")]
    Resolve,
    #[display("unable to write catalog: {}", _0.display())]
    Catalog(#[error(not(source))] PathBuf),
    #[display("issue with path generation from template")]
    Template,
    #[display("unable to create link: {}", _0.display())]
    Link(#[error(not(source))] PathBuf),
    /// The run was cancelled before it finished. Caches have been saved, the
    /// catalog has not been produced.
    #[display("run interrupted")]
    Interrupted,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persist | Self::Catalog(_) | Self::Link(_) | Self::Interrupted)
    }
}
