//! Link views: alternative layouts of the library made of symlinks.
//!
//! Each view is a directory of links whose paths come from an [upon] template
//! rendered against a [`CatalogEntry`]. The template syntax follows upon's
//! Mustache-like conventions (`{{ variable }}`, `{{ value|formatter }}`),
//! extended with two helpers:
//!
//! - **`slug`** converts strings to lowercase, hyphenated slugs, dropping
//!   apostrophes and quotation marks instead of hyphenating them.
//! - **`truncate`** keeps at most `n` characters, usable as either
//!   `truncate(value, n)` or `{{ value|truncate: n }}`.
//!
//! # Template Variables
//!
//! | Variable    | Description                                                  |
//! |-------------|--------------------------------------------------------------|
//! | `title`     | Catalog title (already replaced by the file name if bogus)   |
//! | `publisher` | Normalized publisher, or `Unknown Publisher`                 |
//! | `author`    | First author, or `Unknown Author`                            |
//! | `stem`      | File name without extension                                  |
//! | `ext`       | Lowercase file extension                                     |
//!
//! The document's extension is always appended to the rendered path.

use crate::catalog::{Catalog, CatalogEntry};
use crate::error::{Error, ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use tracing::instrument;
use upon::{Engine, Template};

const UNKNOWN_PUBLISHER: &str = "Unknown Publisher";
const UNKNOWN_AUTHOR: &str = "Unknown Author";

/// Generates link paths from a [`CatalogEntry`] and a user-defined template
/// string.
///
/// Constructed via [`FromStr`], which compiles the template eagerly so that
/// syntax errors surface at creation time rather than at render time.
pub struct PathGenerator {
    engine: Engine<'static>,
    template: Template<'static>,
}
impl FromStr for PathGenerator {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut engine = Engine::new();
        helpers::register(&mut engine);
        let template = engine.compile(s.to_string()).or_raise(|| ErrorKind::Template)?;
        Ok(Self { engine, template })
    }
}
impl PathGenerator {
    /// Renders the template for the catalog entry stored under `key`, then
    /// appends the document's extension.
    ///
    /// The result is relative, normalized and guaranteed to stay inside the
    /// view directory.
    pub fn generate(&self, key: &str, entry: &CatalogEntry) -> Result<PathBuf> {
        let source = Path::new(key);
        let ext = source.extension().map(|ext| ext.to_string_lossy().to_lowercase()).unwrap_or_default();
        let stem = source.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default();
        let rendered = self
            .template
            .render(
                &self.engine,
                upon::value! {
                    title: &entry.title,
                    publisher: entry.publisher_normalized.as_deref().unwrap_or(UNKNOWN_PUBLISHER),
                    author: entry.authors.first().map_or(UNKNOWN_AUTHOR, String::as_str),
                    stem: stem,
                    ext: ext.as_str(),
                },
            )
            .to_string()
            .or_raise(|| ErrorKind::Template)?;
        let path = normalize(&rendered)?;
        Ok(match ext.is_empty() {
            true => path,
            false => PathBuf::from(format!("{}.{ext}", path.display())),
        })
    }
}

/// Trims each segment and resolves the result into a relative path that
/// can't climb out of its base directory. Empty segments (say, from slugging
/// a title with no letters in it) make the whole path invalid.
fn normalize(rendered: &str) -> Result<PathBuf> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in rendered.trim().split('/').map(str::trim) {
        if segment.is_empty() || segment.contains('\0') {
            exn::bail!(ErrorKind::Template);
        }
        match Path::new(segment).components().next().ok_or_raise(|| ErrorKind::Template)? {
            Component::CurDir => {},
            Component::ParentDir => {
                parts.pop().ok_or_raise(|| ErrorKind::Template)?;
            },
            Component::Normal(_) => parts.push(segment),
            Component::RootDir | Component::Prefix(_) => exn::bail!(ErrorKind::Template),
        }
    }
    match parts.is_empty() {
        true => exn::bail!(ErrorKind::Template),
        false => Ok(parts.into_iter().collect()),
    }
}

/// A link to create: `link` (relative to the links directory) should point
/// at `target` (the document, relative to the library).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPlacement {
    pub link: PathBuf,
    pub target: String,
}

/// A set of named views, each a directory inside the links directory.
pub struct LinkPlanner {
    views: Vec<(String, PathGenerator)>,
}
impl LinkPlanner {
    /// Compiles every view's template. Any template that fails to compile
    /// fails the whole planner.
    pub fn new<N, T>(views: impl IntoIterator<Item = (N, T)>) -> Result<Self>
    where
        N: Into<String>,
        T: AsRef<str>,
    {
        let views = views
            .into_iter()
            .map(|(name, template)| Ok((name.into(), template.as_ref().parse::<PathGenerator>()?)))
            .collect::<Result<Vec<_>>>()?;
        for (name, _) in &views {
            normalize(name)?;
        }
        Ok(Self { views })
    }

    /// Computes every link placement for `catalog`. Pure: touches nothing on
    /// disk.
    ///
    /// Entries are visited in key order, so when two entries of the same view
    /// land on the same path the later one deterministically gets `-2`
    /// (then `-3`, …) before its extension.
    #[instrument(skip_all, fields(views = self.views.len(), entries = catalog.len()))]
    pub fn plan(&self, catalog: &Catalog) -> Vec<LinkPlacement> {
        let mut placements = Vec::new();
        for (name, generator) in &self.views {
            let mut taken = HashSet::new();
            for (key, entry) in &catalog.entries {
                let path = match generator.generate(key, entry) {
                    Ok(path) => path,
                    Err(error) => {
                        tracing::warn!(view = name.as_str(), key = key.as_str(), "Skipping link: {error:?}");
                        continue;
                    },
                };
                let link = Path::new(name).join(deduplicate(path, &mut taken));
                placements.push(LinkPlacement { link, target: key.clone() });
            }
        }
        placements
    }
}

fn deduplicate(path: PathBuf, taken: &mut HashSet<PathBuf>) -> PathBuf {
    if taken.insert(path.clone()) {
        return path;
    }
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let ext = path.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
    let mut n = 2u64;
    loop {
        let candidate = path.with_file_name(format!("{stem}-{n}{ext}"));
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Creates the planned links under `links_dir`, pointing at documents in
/// `library`. Existing links at a planned path are replaced; anything else
/// there is left alone and reported. Returns the number of links created.
#[instrument(skip_all, fields(links = %links_dir.display(), placements = placements.len()))]
pub fn materialize(placements: &[LinkPlacement], library: &Path, links_dir: &Path) -> Result<usize> {
    let mut created = 0;
    for placement in placements {
        let link = links_dir.join(&placement.link);
        let target = library.join(&placement.target);
        let failed = || ErrorKind::Link(link.clone());
        if let Some(parent) = link.parent() {
            std::fs::create_dir_all(parent).or_raise(failed)?;
        }
        match std::fs::symlink_metadata(&link) {
            Ok(existing) if existing.file_type().is_symlink() => std::fs::remove_file(&link).or_raise(failed)?,
            Ok(_) => {
                tracing::warn!(link = %link.display(), "Not replacing existing file with a link");
                continue;
            },
            Err(_) => {},
        }
        symlink(&target, &link).or_raise(failed)?;
        created += 1;
    }
    tracing::info!(created, "Links created");
    Ok(created)
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

/// Template helpers for turning catalog values into path segments.
mod helpers {
    use rslug::slugify;
    use std::fmt::Write;
    use upon::{Engine, Value, fmt};

    /// Apostrophes and quotation marks are dropped rather than slugged into
    /// hyphens, so `O'Reilly` becomes `oreilly` and `"Rust"` becomes `rust`.
    fn is_quotation(c: char) -> bool {
        matches!(c, '\'' | '"' | '`' | '\u{2018}'..='\u{201F}' | '\u{00AB}' | '\u{00BB}' | '\u{2039}' | '\u{203A}')
    }

    fn slug(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
        match value {
            Value::String(s) => {
                let unquoted: String = s.chars().filter(|&c| !is_quotation(c)).collect();
                f.write_str(&slugify!(&unquoted))?;
            },
            other => fmt::default(f, other)?,
        }
        Ok(())
    }

    /// At most `max` characters of `s`, trailing whitespace removed. Counts
    /// characters, not bytes, so accented titles aren't cut shorter.
    fn truncate(s: &str, max: usize) -> String {
        s.chars().take(max).collect::<String>().trim_end().to_string()
    }

    pub(super) fn register(engine: &mut Engine<'_>) {
        engine.add_formatter("slug", slug);
        engine.add_function("truncate", truncate);
    }
}
