//! Bibliographic metadata extraction for ebook files.
//!
//! Every supported format implements [`FormatExtractor`], and a [`Registry`]
//! picks the right one from a file's extension. Extraction is synchronous and
//! blocking; callers running inside an async runtime should move it onto a
//! blocking thread.

mod consts;
mod epub;
pub mod error;
mod pdf;

use exn::OptionExt;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

pub use crate::epub::Epub;
use crate::error::{ErrorKind, Result};
pub use crate::pdf::Pdf;

/// Marker that older tooling writes into metadata fields it could not fill.
pub const ABSENT_MARKER: &str = "N/A";

/// Metadata extracted from a single document.
///
/// `None` is the absent sentinel for both `title` and `publisher`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Record {
    pub title: Option<String>,
    /// Authors in the order the document lists them.
    #[cfg_attr(feature = "serde", serde(default))]
    pub authors: Vec<String>,
    /// Publisher exactly as the document spells it.
    pub publisher: Option<String>,
}
impl Record {
    pub fn new<T, A, P>(title: Option<T>, authors: impl IntoIterator<Item = A>, publisher: Option<P>) -> Self
    where
        T: AsRef<str>,
        A: AsRef<str>,
        P: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for author in authors.into_iter().filter_map(present) {
            if !unique.contains(&author) {
                unique.push(author);
            }
        }
        Self {
            title: title.and_then(present),
            authors: unique,
            publisher: publisher.and_then(present),
        }
    }
}

/// Trims a raw metadata value, mapping empty strings and [`ABSENT_MARKER`]
/// to `None`.
pub fn present(value: impl AsRef<str>) -> Option<String> {
    let value = value.as_ref().trim();
    (!value.is_empty() && value != ABSENT_MARKER).then(|| value.to_string())
}

/// A format-specific metadata extraction capability.
pub trait FormatExtractor: Send + Sync {
    /// Short, human-readable format name used in logs.
    fn name(&self) -> &'static str;
    /// Lowercase file extensions (without the dot) this extractor handles.
    fn extensions(&self) -> &[&'static str];
    /// Extracts metadata from the document at `path`.
    fn extract(&self, path: &Path) -> Result<Record>;
}

/// Maps file extensions to the [`FormatExtractor`] responsible for them.
///
/// Extension matching is case-insensitive. Registering a second extractor
/// for an extension replaces the first.
#[derive(Clone, Default)]
pub struct Registry {
    by_extension: HashMap<String, Arc<dyn FormatExtractor>>,
}
impl Registry {
    /// An empty registry that recognizes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in [`Epub`] and [`Pdf`] extractors.
    pub fn with_defaults() -> Self {
        Self::new().register(Arc::new(Epub)).register(Arc::new(Pdf))
    }

    pub fn register(mut self, extractor: Arc<dyn FormatExtractor>) -> Self {
        for extension in extractor.extensions() {
            self.by_extension.insert(extension.to_ascii_lowercase(), Arc::clone(&extractor));
        }
        self
    }

    /// Returns the extractor claiming `path`'s extension, if any.
    pub fn for_path(&self, path: impl AsRef<Path>) -> Option<Arc<dyn FormatExtractor>> {
        let extension = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        self.by_extension.get(&extension).cloned()
    }

    pub fn supports(&self, path: impl AsRef<Path>) -> bool {
        self.for_path(path).is_some()
    }

    /// Extracts `path` with whichever extractor claims it.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn extract(&self, path: impl AsRef<Path>) -> Result<Record> {
        let path = path.as_ref();
        let extractor = self.for_path(path).ok_or_raise(|| ErrorKind::Unsupported(path.to_path_buf()))?;
        extractor.extract(path)
    }
}
impl Debug for Registry {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut extensions: Vec<_> = self.by_extension.iter().map(|(ext, x)| (ext.as_str(), x.name())).collect();
        extensions.sort_unstable();
        f.debug_struct("Registry").field("extensions", &extensions).finish()
    }
}
