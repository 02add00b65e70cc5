//! The catalog: one normalized entry per document, keyed by its path inside
//! the library.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use shelf_extract::{ABSENT_MARKER, Record};
use shelf_resolve::Resolution;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Component, Path};
use tempfile::NamedTempFile;
use tracing::instrument;

/// Title fragments that give away a title as a leftover from whatever
/// produced the file rather than the book's real title.
const IMPLAUSIBLE_TITLE_PATTERNS: &[&str] = &[
    // Leaked file names.
    ".pdf",
    ".doc",
    ".docx",
    ".rtf",
    ".txt",
    ".tex",
    ".dvi",
    ".indd",
    ".qxd",
    ".epub",
    ".html",
    // Authoring tool boilerplate.
    "microsoft word",
    "untitled",
    "adobe indesign",
    "acrobat",
    "pdfmaker",
    "quarkxpress",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub title: String,
    pub authors: Vec<String>,
    /// Publisher exactly as the document spells it.
    pub publisher: Option<String>,
    /// Canonical publisher, or the raw spelling when it couldn't be resolved.
    pub publisher_normalized: Option<String>,
}

/// Catalog entries ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    pub entries: BTreeMap<String, CatalogEntry>,
}
impl Catalog {
    /// Builds the catalog from every document's record and the publisher
    /// resolution. The result doesn't depend on the order of `records`.
    ///
    /// `root` is the library directory; keys are document paths relative to
    /// it, `/`-separated.
    pub fn assemble<'a>(
        root: &Path,
        records: impl IntoIterator<Item = (&'a Path, &'a Record)>,
        resolution: &Resolution,
    ) -> Self {
        let entries = records
            .into_iter()
            .map(|(path, record)| {
                let entry = CatalogEntry {
                    title: record
                        .title
                        .as_deref()
                        .filter(|title| is_plausible_title(title))
                        .map_or_else(|| stem(path), str::to_string),
                    authors: record.authors.clone(),
                    publisher: record.publisher.clone(),
                    publisher_normalized: record.publisher.as_deref().map(|raw| resolution.canonical(raw).to_string()),
                };
                (key(root, path), entry)
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Atomically writes the catalog as pretty-printed JSON.
    #[instrument(skip_all, fields(path = %path.as_ref().display(), entries = self.len()))]
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let catalog = || ErrorKind::Catalog(path.to_path_buf());
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(directory).or_raise(catalog)?;
        let mut file = NamedTempFile::new_in(directory).or_raise(catalog)?;
        serde_json::to_writer_pretty(&mut file, self).or_raise(catalog)?;
        file.write_all(b"\n").or_raise(catalog)?;
        file.as_file().sync_all().or_raise(catalog)?;
        file.persist(path).or_raise(catalog)?;
        Ok(())
    }
}

/// Whether `title` looks like a real title rather than a placeholder or a
/// leftover from the tool that produced the file.
pub fn is_plausible_title(title: &str) -> bool {
    let title = title.trim();
    if title.is_empty() || title == ABSENT_MARKER {
        return false;
    }
    let lowercase = title.to_lowercase();
    !IMPLAUSIBLE_TITLE_PATTERNS.iter().any(|pattern| lowercase.contains(pattern))
}

fn stem(path: &Path) -> String {
    path.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default()
}

/// The path of `path` inside `root`, `/`-separated whatever the platform.
pub fn key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
