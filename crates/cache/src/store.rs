//! Durable, human-readable key-value files.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::instrument;

/// A flat JSON object on disk, held in memory as an ordered map.
///
/// The file is only ever read once (on [`load`](Self::load)) and rewritten as
/// a whole on [`save`](Self::save).
#[derive(Debug, Clone)]
pub(crate) struct JsonStore<V> {
    path: PathBuf,
    pub(crate) entries: BTreeMap<String, V>,
}
impl<V: Serialize + DeserializeOwned> JsonStore<V> {
    /// Reads the store at `path`.
    ///
    /// A missing file, an empty file and a file that doesn't parse all load as
    /// an empty store; the next [`save`](Self::save) replaces whatever was
    /// there.
    #[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub(crate) fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|error| {
                tracing::warn!(path = %path.display(), %error, "Cache file is corrupt; starting from empty");
                BTreeMap::new()
            }),
            Err(error) if error.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "Cache file is unreadable; starting from empty");
                BTreeMap::new()
            },
        };
        Self { path, entries }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replaces the file on disk with the in-memory contents.
    ///
    /// Writes to a temporary file in the same directory and renames it over
    /// the destination, so an interrupted save never leaves a truncated cache.
    #[instrument(level = "debug", skip_all, fields(path = %self.path.display(), entries = self.entries.len()))]
    pub(crate) fn save(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.entries).or_raise(|| ErrorKind::InvalidData)?;
        let persist = || ErrorKind::Persist(self.path.clone());
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(directory).or_raise(persist)?;
        let mut file = NamedTempFile::new_in(directory).or_raise(persist)?;
        file.write_all(&json).or_raise(persist)?;
        file.write_all(b"\n").or_raise(persist)?;
        file.as_file().sync_all().or_raise(persist)?;
        file.persist(&self.path).or_raise(persist)?;
        Ok(())
    }
}
