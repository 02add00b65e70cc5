use crate::error::Result;
use crate::store::JsonStore;
use std::path::Path;

/// Persistent mapping from raw publisher spelling to its canonical name.
///
/// A name present here is never resolved again, so only confident answers
/// (rule matches and successful external resolutions) belong in it.
#[derive(Debug, Clone)]
pub struct PublisherCache {
    store: JsonStore<String>,
}
impl PublisherCache {
    /// Loads the cache from `path`. Never fails; see [`JsonStore::load`].
    pub fn load(path: impl AsRef<Path>) -> Self {
        Self { store: JsonStore::load(path) }
    }

    pub fn get(&self, raw: &str) -> Option<&str> {
        self.store.entries.get(raw).map(String::as_str)
    }

    pub fn contains(&self, raw: &str) -> bool {
        self.store.entries.contains_key(raw)
    }

    pub fn insert(&mut self, raw: impl Into<String>, canonical: impl Into<String>) {
        self.store.entries.insert(raw.into(), canonical.into());
    }

    /// Forgets every resolution, forcing all names through rules and the
    /// external fallback again.
    pub fn invalidate(&mut self) {
        self.store.entries.clear();
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
}
