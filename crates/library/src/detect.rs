//! Change detection: deciding which documents need extracting again.

use shelf_cache::{Entry, Fingerprint, FingerprintStrategy, MetadataCache};
use shelf_extract::Record;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Files are hashed in chunks of this many bytes, so memory use does not
/// depend on file size.
pub const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Computes the current fingerprint of `path`. Blocking.
pub fn fingerprint(path: impl AsRef<Path>, strategy: FingerprintStrategy) -> io::Result<Fingerprint> {
    let path = path.as_ref();
    match strategy {
        FingerprintStrategy::Modified => {
            let modified = std::fs::metadata(path)?.modified()?;
            Ok(Fingerprint::Modified(OffsetDateTime::from(modified)))
        },
        FingerprintStrategy::Hash => {
            let mut file = File::open(path)?;
            let mut hasher = blake3::Hasher::new();
            let mut buffer = vec![0; HASH_CHUNK_SIZE];
            loop {
                match file.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(read) => hasher.update(&buffer[..read]),
                    Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                    Err(error) => return Err(error),
                };
            }
            Ok(Fingerprint::Hash(hasher.finalize().to_hex().to_string()))
        },
    }
}

/// Whether a document's cached record can be reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// The cached record is still valid.
    Hit(Record),
    /// The document is new, changed, or could not be fingerprinted.
    Miss,
}

/// Classifies a single document against its cached entry. Blocking.
///
/// Force-reload misses every document without looking at the cache. A file
/// that can't be fingerprinted (it vanished after discovery, or isn't
/// readable) is a miss; extraction will then fail for it and report why.
pub fn detect(
    path: impl AsRef<Path>,
    cached: Option<&Entry>,
    strategy: FingerprintStrategy,
    force_reload: bool,
) -> Detection {
    let path = path.as_ref();
    let Some(entry) = cached.filter(|_| !force_reload) else {
        return Detection::Miss;
    };
    // Never hash a file whose cached entry came from the other strategy; it
    // can't match.
    if entry.fingerprint.strategy() != strategy {
        return Detection::Miss;
    }
    match fingerprint(path, strategy) {
        Ok(current) if entry.is_valid_for(&current) => Detection::Hit(entry.record.clone()),
        Ok(_) => Detection::Miss,
        Err(error) => {
            tracing::debug!(path = %path.display(), %error, "Unable to fingerprint file");
            Detection::Miss
        },
    }
}

/// Documents split by whether they need extracting.
#[derive(Debug, Default)]
pub struct Partition {
    pub hits: Vec<(PathBuf, Record)>,
    pub misses: Vec<PathBuf>,
}

/// The owned inputs [`detect`] needs for one file, so it can run on a
/// blocking thread.
pub(crate) fn detection_job(
    path: PathBuf,
    cache: &MetadataCache,
    strategy: FingerprintStrategy,
    force_reload: bool,
) -> impl FnOnce() -> Detection + Send + 'static {
    let cached = cache.get(&path).cloned();
    move || detect(&path, cached.as_ref(), strategy, force_reload)
}
