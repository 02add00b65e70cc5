use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::store::JsonStore;
use serde::{Deserialize, Serialize};
use shelf_extract::Record;
use std::collections::HashSet;
use std::path::Path;

/// What was extracted from a file, and what the file looked like at the time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub fingerprint: Fingerprint,
    pub record: Record,
}
impl Entry {
    /// An entry may be reused only while the file still has the fingerprint it
    /// had when it was extracted.
    pub fn is_valid_for(&self, current: &Fingerprint) -> bool {
        self.fingerprint == *current
    }
}

/// Persistent mapping from absolute file path to its last extraction.
///
/// Only the run that owns the cache writes to it; extraction workers hand
/// their results back to the owner, which calls [`put`](Self::put).
#[derive(Debug, Clone)]
pub struct MetadataCache {
    store: JsonStore<Entry>,
}
impl MetadataCache {
    /// Loads the cache from `path`. Never fails; see [`JsonStore::load`].
    pub fn load(path: impl AsRef<Path>) -> Self {
        Self { store: JsonStore::load(path) }
    }

    pub fn get(&self, file: impl AsRef<Path>) -> Option<&Entry> {
        self.store.entries.get(Self::key(file.as_ref()).as_str())
    }

    /// Records a fresh extraction, superseding any previous entry for `file`.
    pub fn put(&mut self, file: impl AsRef<Path>, fingerprint: Fingerprint, record: Record) {
        self.store.entries.insert(Self::key(file.as_ref()), Entry { fingerprint, record });
    }

    /// Forgets files under `root` that aren't in `present`, i.e. documents
    /// that were deleted, renamed or moved out of the library. Entries outside
    /// `root` belong to other libraries sharing this cache and are kept.
    /// Returns how many entries were dropped.
    pub fn prune<'a>(&mut self, root: impl AsRef<Path>, present: impl IntoIterator<Item = &'a Path>) -> usize {
        let root = root.as_ref();
        let present: HashSet<String> = present.into_iter().map(Self::key).collect();
        let before = self.store.entries.len();
        self.store.entries.retain(|key, _| !Path::new(key).starts_with(root) || present.contains(key));
        before - self.store.entries.len()
    }

    pub fn len(&self) -> usize {
        self.store.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    pub fn save(&self) -> Result<()> {
        self.store.save()
    }

    // JSON object keys have to be strings; lossy is fine for the odd non-UTF-8
    // path since the worst case is a cache miss.
    fn key(file: &Path) -> String {
        file.to_string_lossy().into_owned()
    }
}
