use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use shelf_extract::Registry;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::instrument;

/// Lists the documents under `root` that some extractor in `registry` can
/// read, sorted by path.
///
/// Hidden entries (leading `.`) are skipped, which also keeps the default
/// cache directory out of the listing. Symlinks to files are followed;
/// broken links and links to directories are skipped. Subdirectories are
/// only descended into when `recursive` is set.
///
/// Returned paths are absolute. Failing to read `root` itself is an error;
/// failing to read anything below it is logged and skipped.
#[instrument(skip_all, fields(root = %root.as_ref().display(), recursive = recursive))]
pub async fn discover(root: impl AsRef<Path>, recursive: bool, registry: &Registry) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();
    let library = || ErrorKind::Library(root.to_path_buf());
    let root = fs::canonicalize(root).await.or_raise(library)?;
    if !fs::metadata(&root).await.or_raise(library)?.is_dir() {
        exn::bail!(library());
    }
    // Fail on an unreadable root before walking, so that only nested
    // directories get the lenient treatment below.
    drop(fs::read_dir(&root).await.or_raise(library)?);

    let mut files = Vec::new();
    let mut stack = vec![root];
    while let Some(current) = stack.pop() {
        let mut entries = match fs::read_dir(&current).await {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(path = %current.display(), %error, "Skipping unreadable directory");
                continue;
            },
        };
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(error) => {
                    tracing::warn!(path = %current.display(), %error, "Skipping unreadable directory entry");
                    continue;
                },
            };
            if entry.file_name().as_encoded_bytes().starts_with(b".") {
                continue;
            }
            let path = entry.path();
            let Ok(kind) = entry.file_type().await else { continue };
            if kind.is_dir() {
                if recursive {
                    stack.push(path);
                }
                continue;
            }
            // `metadata` follows symlinks; a broken link fails here.
            match fs::metadata(&path).await {
                Ok(metadata) if metadata.is_file() && registry.supports(&path) => files.push(path),
                Ok(_) => {},
                Err(error) => tracing::debug!(path = %path.display(), %error, "Skipping unreadable entry"),
            }
        }
    }
    files.sort();
    tracing::debug!(files = files.len(), "Discovery complete");
    Ok(files)
}
