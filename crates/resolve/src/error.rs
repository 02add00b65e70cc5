//! Resolution Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! None of these abort a run on their own: a broken rule table means no
//! rules, and a failed request leaves its names unresolved. The only error
//! [`Resolver::resolve`](crate::Resolver::resolve) returns is
//! [`Interrupted`](ErrorKind::Interrupted).

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A resolution error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for resolution operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The rule table could not be read or parsed.
    #[display("invalid publisher rule table: {}", _0.display())]
    Rules(#[error(not(source))] PathBuf),
    /// The prompt template failed to compile or render.
    #[display("invalid normalizer prompt template")]
    Prompt,
    /// The HTTP client could not be configured (bad credential, TLS setup).
    #[display("unable to configure normalizer client")]
    Client,
    /// The request never got a response.
    #[display("normalizer request failed")]
    Request,
    /// The endpoint answered with a non-success status.
    #[display("normalizer endpoint returned status {_0}")]
    Status(#[error(not(source))] u16),
    /// The response did not contain the expected JSON object.
    #[display("malformed normalizer response")]
    Response,
    /// Resolution stopped because the run was cancelled.
    #[display("publisher resolution interrupted")]
    Interrupted,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request => true,
            Self::Status(status) => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
