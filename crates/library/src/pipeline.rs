//! One run over a library: discover, detect changes, extract, resolve,
//! assemble.

use crate::catalog::Catalog;
use crate::detect::{Detection, Partition, detection_job};
use crate::discover::discover;
use crate::error::{ErrorKind, Result};
use crate::pool::{ExtractionEvent, blocking, extract_all};
use derive_more::Display;
use exn::ResultExt;
use futures::StreamExt;
use shelf_cache::{FingerprintStrategy, METADATA_CACHE_FILE, MetadataCache, PUBLISHER_CACHE_FILE, PublisherCache};
use shelf_extract::Registry;
use shelf_resolve::error::ErrorKind as ResolveErrorKind;
use shelf_resolve::{ResolutionStats, Resolver};
use std::num::NonZeroUsize;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Both caches of a run, loaded at the start and saved when the run ends.
///
/// Call [`flush`](Self::flush) to save and see whether saving worked. If a
/// `Stores` is dropped without having been flushed (the run was abandoned,
/// or the owner panicked), dropping saves it, logging any failure.
#[derive(Debug)]
pub struct Stores {
    pub metadata: MetadataCache,
    pub publishers: PublisherCache,
    flushed: bool,
}
impl Stores {
    /// Loads both caches from `cache_dir`. With `reset_publishers`, every
    /// remembered publisher resolution is forgotten.
    #[instrument(skip_all, fields(cache_dir = %cache_dir.as_ref().display()))]
    pub fn open(cache_dir: impl AsRef<Path>, reset_publishers: bool) -> Self {
        let cache_dir = cache_dir.as_ref();
        let metadata = MetadataCache::load(cache_dir.join(METADATA_CACHE_FILE));
        let mut publishers = PublisherCache::load(cache_dir.join(PUBLISHER_CACHE_FILE));
        if reset_publishers {
            tracing::info!(forgotten = publishers.len(), "Resetting publisher cache");
            publishers.invalidate();
        }
        tracing::debug!(metadata = metadata.len(), publishers = publishers.len(), "Caches loaded");
        Self { metadata, publishers, flushed: false }
    }

    /// Saves both caches. Both are attempted even if the first fails.
    pub fn flush(&mut self) -> Result<()> {
        self.flushed = true;
        let metadata = self.metadata.save();
        let publishers = self.publishers.save();
        match (metadata, publishers) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(error), Ok(())) => Err(error).or_raise(|| ErrorKind::Persist),
            (Ok(()), Err(error)) => Err(error).or_raise(|| ErrorKind::Persist),
            (Err(error), Err(second)) => {
                tracing::error!("Unable to save publisher cache: {second:?}");
                Err(error).or_raise(|| ErrorKind::Persist)
            },
        }
    }
}
impl Drop for Stores {
    fn drop(&mut self) {
        if !self.flushed
            && let Err(error) = self.flush()
        {
            tracing::error!("Unable to save caches: {error:?}");
        }
    }
}

#[derive(Debug, Clone)]
pub struct Options {
    pub library: PathBuf,
    pub recursive: bool,
    pub concurrency: NonZeroUsize,
    pub fingerprint: FingerprintStrategy,
    pub force_reload: bool,
}
impl Options {
    pub fn new(library: impl Into<PathBuf>) -> Self {
        Self {
            library: library.into(),
            recursive: false,
            concurrency: std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
            fingerprint: FingerprintStrategy::default(),
            force_reload: false,
        }
    }
}

/// What a run did.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq)]
#[display("{discovered} documents: {cached} unchanged, {extracted} extracted, {failed} failed")]
pub struct RunStats {
    pub discovered: usize,
    pub cached: usize,
    pub extracted: usize,
    pub failed: usize,
    pub publishers: ResolutionStats,
}

#[derive(Debug, Clone)]
pub struct Report {
    /// Canonical library directory that catalog keys are relative to.
    pub library: PathBuf,
    pub catalog: Catalog,
    pub stats: RunStats,
}

pub struct Pipeline {
    registry: Arc<Registry>,
    resolver: Resolver,
    options: Options,
}
impl Pipeline {
    pub fn new(registry: Arc<Registry>, resolver: Resolver, options: Options) -> Self {
        Self { registry, resolver, options }
    }

    /// Runs every stage, then saves `stores` whatever happened.
    ///
    /// A stage failure wins over a save failure; either fails the run.
    /// Cancelling `cancel` stops the run at the next opportunity with
    /// [`ErrorKind::Interrupted`], after saving what was done so far.
    #[instrument(skip_all, fields(library = %self.options.library.display()))]
    pub async fn run(&self, mut stores: Stores, cancel: &CancellationToken) -> Result<Report> {
        let outcome = self.stages(&mut stores, cancel).await;
        let flushed = stores.flush();
        match (outcome, flushed) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(_), Err(error)) => Err(error),
            (Err(error), Ok(())) => Err(error),
            (Err(error), Err(flush)) => {
                tracing::error!("Unable to save caches: {flush:?}");
                Err(error)
            },
        }
    }

    async fn stages(&self, stores: &mut Stores, cancel: &CancellationToken) -> Result<Report> {
        let Options { library, recursive, concurrency, fingerprint, force_reload } = &self.options;
        let library = tokio::fs::canonicalize(library).await.or_raise(|| ErrorKind::Library(library.clone()))?;
        let files = discover(&library, *recursive, &self.registry).await?;
        let mut stats = RunStats { discovered: files.len(), ..RunStats::default() };
        tracing::info!(documents = files.len(), "Discovered documents");
        let forgotten = stores.metadata.prune(&library, files.iter().map(PathBuf::as_path));
        if forgotten > 0 {
            tracing::info!(forgotten, "Forgot cached metadata of documents no longer in the library");
        }

        let Partition { hits, mut misses } = match *force_reload {
            true => Partition { hits: Vec::new(), misses: files },
            false => self.detect(files, &stores.metadata, cancel).await?,
        };
        stats.cached = hits.len();
        misses.sort();
        tracing::info!(unchanged = hits.len(), changed = misses.len(), "Change detection complete");

        let mut records = hits;
        let mut events = pin!(extract_all(Arc::clone(&self.registry), misses, *fingerprint, *concurrency));
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => exn::bail!(ErrorKind::Interrupted),
                event = events.next() => event,
            };
            match event {
                Some(ExtractionEvent::Started(total)) if total > 0 => tracing::info!(total, "Extracting metadata"),
                Some(ExtractionEvent::Extracted { path, fingerprint, record, progress }) => {
                    tracing::info!(%progress, path = %path.display(), "Extracted");
                    stores.metadata.put(&path, fingerprint, record.clone());
                    records.push((path, record));
                    stats.extracted += 1;
                },
                Some(ExtractionEvent::Failed { progress, .. }) => {
                    tracing::info!(%progress, "Extraction failed");
                    stats.failed += 1;
                },
                Some(_) => {},
                None => break,
            }
        }

        let names = records.iter().filter_map(|(_, record)| record.publisher.as_deref());
        let resolution = match self.resolver.resolve(names, &mut stores.publishers, cancel).await {
            Ok(resolution) => resolution,
            Err(error) if matches!(error.deref(), ResolveErrorKind::Interrupted) => {
                return Err(error).or_raise(|| ErrorKind::Interrupted);
            },
            Err(error) => return Err(error).or_raise(|| ErrorKind::Resolve),
        };
        stats.publishers = resolution.stats;

        let catalog = Catalog::assemble(&library, records.iter().map(|(path, record)| (path.as_path(), record)), &resolution);
        tracing::info!("Run complete: {stats}");
        Ok(Report { library, catalog, stats })
    }

    /// Splits `files` into cache hits and misses, fingerprinting on the
    /// blocking pool.
    async fn detect(&self, files: Vec<PathBuf>, cache: &MetadataCache, cancel: &CancellationToken) -> Result<Partition> {
        let Options { concurrency, fingerprint, force_reload, .. } = self.options;
        let jobs: Vec<_> = files
            .into_iter()
            .map(|path| (path.clone(), detection_job(path, cache, fingerprint, force_reload)))
            .collect();
        let mut detections = pin!(blocking(jobs, concurrency));
        let mut partition = Partition::default();
        loop {
            let detection = tokio::select! {
                biased;
                _ = cancel.cancelled() => exn::bail!(ErrorKind::Interrupted),
                detection = detections.next() => detection,
            };
            match detection {
                Some((path, Ok(Detection::Hit(record)))) => partition.hits.push((path, record)),
                Some((path, Ok(Detection::Miss))) => partition.misses.push(path),
                Some((path, Err(error))) => {
                    tracing::warn!(path = %path.display(), %error, "Change detection did not complete");
                    partition.misses.push(path);
                },
                None => break,
            }
        }
        Ok(partition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shelf_extract::error::Result as ExtractResult;
    use shelf_extract::{FormatExtractor, Record};
    use shelf_resolve::error::Result as ResolveResult;
    use shelf_resolve::{Normalizer, Rule, RuleTable};
    use std::collections::HashMap;
    use std::fs::File;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};

    const EPOCH: Duration = Duration::from_secs(1_700_000_000);

    /// Reads `title|author, author|publisher` from `.epub` and `.pdf` files
    /// and counts how often it is asked to.
    #[derive(Default)]
    struct Plain {
        calls: AtomicUsize,
    }
    impl FormatExtractor for Plain {
        fn name(&self) -> &'static str {
            "plain"
        }

        fn extensions(&self) -> &[&'static str] {
            &["epub", "pdf"]
        }

        fn extract(&self, path: &Path) -> ExtractResult<Record> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let contents = std::fs::read_to_string(path).unwrap();
            let mut fields = contents.split('|');
            let title = fields.next();
            let authors = fields.next().unwrap_or_default().split(',');
            Ok(Record::new(title, authors, fields.next()))
        }
    }

    /// Upper-cases every name, failing any request that contains one of
    /// `failing`.
    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
        failing: &'static [&'static str],
    }
    #[async_trait]
    impl Normalizer for Counting {
        async fn normalize(&self, names: &[String]) -> ResolveResult<HashMap<String, String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if names.iter().any(|name| self.failing.contains(&name.as_str())) {
                exn::bail!(shelf_resolve::error::ErrorKind::Status(503));
            }
            Ok(names.iter().map(|name| (name.clone(), name.to_uppercase())).collect())
        }
    }

    /// [`Plain`], cancelling `cancel` once it has been called `after` times.
    struct Cancelling {
        inner: Arc<Plain>,
        cancel: CancellationToken,
        after: usize,
    }
    impl FormatExtractor for Cancelling {
        fn name(&self) -> &'static str {
            "cancelling"
        }

        fn extensions(&self) -> &[&'static str] {
            self.inner.extensions()
        }

        fn extract(&self, path: &Path) -> ExtractResult<Record> {
            let record = self.inner.extract(path);
            if self.inner.calls.load(Ordering::SeqCst) >= self.after {
                self.cancel.cancel();
            }
            record
        }
    }

    struct Fixture {
        library: tempfile::TempDir,
        cache: tempfile::TempDir,
        extractor: Arc<Plain>,
        normalizer: Arc<Counting>,
    }
    impl Fixture {
        fn new(files: &[(&str, &str)]) -> Self {
            let fixture = Self {
                library: tempfile::tempdir().unwrap(),
                cache: tempfile::tempdir().unwrap(),
                extractor: Arc::default(),
                normalizer: Arc::default(),
            };
            for (name, contents) in files {
                fixture.write(name, contents, SystemTime::UNIX_EPOCH + EPOCH);
            }
            fixture
        }

        fn write(&self, name: &str, contents: &str, modified: SystemTime) {
            let path = self.library.path().join(name);
            std::fs::write(&path, contents).unwrap();
            File::options().write(true).open(&path).unwrap().set_modified(modified).unwrap();
        }

        fn pipeline(&self) -> Pipeline {
            let rules = RuleTable::new([
                Rule::new("O'Reilly Media", ["reilly"]),
                Rule::new("Packt Publishing", ["packt"]),
            ]);
            let normalizer: Arc<dyn Normalizer> = self.normalizer.clone();
            let resolver = Resolver::new(rules).with_normalizer(normalizer);
            let registry = Arc::new(Registry::new().register(self.extractor.clone()));
            let options =
                Options { concurrency: NonZeroUsize::new(2).unwrap(), ..Options::new(self.library.path()) };
            Pipeline::new(registry, resolver, options)
        }

        async fn run(&self) -> Result<Report> {
            let stores = Stores::open(self.cache.path(), false);
            self.pipeline().run(stores, &CancellationToken::new()).await
        }

        fn extractions(&self) -> usize {
            self.extractor.calls.load(Ordering::SeqCst)
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_publishers_resolved_by_rules_make_no_external_calls() {
        let fixture = Fixture::new(&[
            ("a.epub", "Learning Rust|Ann|O'Reilly"),
            ("b.pdf", "Mastering Tokio|Ben|Packt Publishing Ltd"),
            ("c.epub", "Plain Book|Cat|"),
        ]);

        let report = fixture.run().await.unwrap();

        let entries = &report.catalog.entries;
        assert_eq!(entries.len(), 3);
        assert_eq!(entries["a.epub"].publisher_normalized.as_deref(), Some("O'Reilly Media"));
        assert_eq!(entries["b.pdf"].publisher_normalized.as_deref(), Some("Packt Publishing"));
        assert_eq!(entries["b.pdf"].publisher.as_deref(), Some("Packt Publishing Ltd"));
        assert_eq!(entries["c.epub"].publisher_normalized, None);
        assert_eq!(fixture.normalizer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.stats.publishers.rules, 2);
        assert_eq!(report.stats.extracted, 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_second_run_is_all_hits() {
        let fixture = Fixture::new(&[
            ("a.epub", "Learning Rust|Ann|O'Reilly"),
            ("b.pdf", "Gardening|Ben|Green Thumb Press"),
        ]);

        let first = fixture.run().await.unwrap();
        assert_eq!(fixture.extractions(), 2);
        assert_eq!(fixture.normalizer.calls.load(Ordering::SeqCst), 1);
        let second = fixture.run().await.unwrap();

        assert_eq!(fixture.extractions(), 2);
        assert_eq!(second.catalog, first.catalog);
        assert_eq!(second.stats.cached, 2);
        assert_eq!(second.stats.extracted, 0);
        // The external answer was remembered.
        assert_eq!(fixture.normalizer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.stats.publishers.cached, 2);
        assert_eq!(second.catalog.entries["b.pdf"].publisher_normalized.as_deref(), Some("GREEN THUMB PRESS"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_only_changed_documents_are_extracted_again() {
        let fixture = Fixture::new(&[("a.epub", "Alpha|Ann|"), ("b.pdf", "Beta|Ben|"), ("c.epub", "Gamma|Cat|")]);
        fixture.run().await.unwrap();

        fixture.write("b.pdf", "Beta, Second Edition|Ben|", SystemTime::UNIX_EPOCH + EPOCH + Duration::from_secs(60));
        let report = fixture.run().await.unwrap();

        assert_eq!(fixture.extractions(), 4);
        assert_eq!(report.stats.cached, 2);
        assert_eq!(report.stats.extracted, 1);
        assert_eq!(report.catalog.entries["b.pdf"].title, "Beta, Second Edition");
        let cache = MetadataCache::load(fixture.cache.path().join(METADATA_CACHE_FILE));
        let stored = cache.get(report.library.join("b.pdf")).unwrap();
        assert_eq!(stored.record.title.as_deref(), Some("Beta, Second Edition"));
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_force_reload_extracts_everything() {
        let fixture = Fixture::new(&[("a.epub", "Alpha|Ann|"), ("b.pdf", "Beta|Ben|")]);
        fixture.run().await.unwrap();

        let mut pipeline = fixture.pipeline();
        pipeline.options.force_reload = true;
        let report = pipeline.run(Stores::open(fixture.cache.path(), false), &CancellationToken::new()).await.unwrap();

        assert_eq!(fixture.extractions(), 4);
        assert_eq!(report.stats.cached, 0);
        assert_eq!(report.stats.extracted, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_documents_are_left_out_and_retried() {
        let fixture = Fixture::new(&[("a.epub", "Alpha|Ann|"), ("broken.pdf", "Broken|Ben|")]);
        // Not valid UTF-8, so the extractor can't read it.
        std::fs::write(fixture.library.path().join("broken.pdf"), [0xff, 0xfe]).unwrap();
        let pipeline = {
            let registry = Registry::new().register(Arc::new(Fallible(fixture.extractor.clone())));
            Pipeline { registry: Arc::new(registry), ..fixture.pipeline() }
        };

        let first = pipeline.run(Stores::open(fixture.cache.path(), false), &CancellationToken::new()).await.unwrap();
        let second = pipeline.run(Stores::open(fixture.cache.path(), false), &CancellationToken::new()).await.unwrap();

        assert_eq!(first.catalog.entries.keys().collect::<Vec<_>>(), ["a.epub"]);
        assert_eq!((first.stats.extracted, first.stats.failed), (1, 1));
        // Failures aren't cached.
        assert_eq!((second.stats.cached, second.stats.failed), (1, 1));
    }

    /// [`Plain`], but failing instead of panicking on unreadable files.
    struct Fallible(Arc<Plain>);
    impl FormatExtractor for Fallible {
        fn name(&self) -> &'static str {
            "fallible"
        }

        fn extensions(&self) -> &[&'static str] {
            self.0.extensions()
        }

        fn extract(&self, path: &Path) -> ExtractResult<Record> {
            if std::str::from_utf8(&std::fs::read(path).unwrap()).is_err() {
                exn::bail!(shelf_extract::error::ErrorKind::Unsupported(path.to_path_buf()));
            }
            self.0.extract(path)
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_interrupted_run_still_saves_caches() {
        let fixture = Fixture::new(&[("a.epub", "Alpha|Ann|O'Reilly")]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut stores = Stores::open(fixture.cache.path(), false);
        stores.publishers.insert("Manning Publications Co.", "Manning");

        let error = fixture.pipeline().run(stores, &cancel).await.unwrap_err();

        assert_eq!(*error.deref(), ErrorKind::Interrupted);
        let publishers = PublisherCache::load(fixture.cache.path().join(PUBLISHER_CACHE_FILE));
        assert_eq!(publishers.get("Manning Publications Co."), Some("Manning"));
        assert!(fixture.cache.path().join(METADATA_CACHE_FILE).exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_chunk_keeps_raw_names_out_of_the_cache() {
        let mut fixture = Fixture::new(&[
            ("a.epub", "Alpha|Ann|Green Thumb Press"),
            ("b.pdf", "Beta|Ben|Bad Press Ltd"),
            ("c.epub", "Gamma|Cat|Harbor House"),
        ]);
        fixture.normalizer = Arc::new(Counting { failing: &["Bad Press Ltd"], ..Counting::default() });
        let normalizer: Arc<dyn Normalizer> = fixture.normalizer.clone();
        let pipeline = Pipeline {
            resolver: Resolver::new(RuleTable::default()).with_normalizer(normalizer).with_chunk_size(1),
            ..fixture.pipeline()
        };

        let report = pipeline.run(Stores::open(fixture.cache.path(), false), &CancellationToken::new()).await.unwrap();

        let entries = &report.catalog.entries;
        assert_eq!(entries["b.pdf"].publisher.as_deref(), Some("Bad Press Ltd"));
        assert_eq!(entries["b.pdf"].publisher_normalized, entries["b.pdf"].publisher);
        assert_eq!(entries["a.epub"].publisher_normalized.as_deref(), Some("GREEN THUMB PRESS"));
        assert_eq!(entries["c.epub"].publisher_normalized.as_deref(), Some("HARBOR HOUSE"));
        assert_eq!(fixture.normalizer.calls.load(Ordering::SeqCst), 3);
        assert_eq!((report.stats.publishers.external, report.stats.publishers.failed_chunks), (2, 1));
        let publishers = PublisherCache::load(fixture.cache.path().join(PUBLISHER_CACHE_FILE));
        assert_eq!(publishers.get("Bad Press Ltd"), None);
        assert_eq!(publishers.get("Green Thumb Press"), Some("GREEN THUMB PRESS"));
        assert_eq!(publishers.get("Harbor House"), Some("HARBOR HOUSE"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_interrupted_extraction_keeps_committed_records() {
        let fixture = Fixture::new(&[
            ("a.epub", "Alpha|Ann|"),
            ("b.pdf", "Beta|Ben|"),
            ("c.epub", "Gamma|Cat|"),
            ("d.pdf", "Delta|Dan|"),
            ("e.epub", "Epsilon|Eve|"),
        ]);
        let cancel = CancellationToken::new();
        let cancelling = Cancelling { inner: fixture.extractor.clone(), cancel: cancel.clone(), after: 3 };
        let pipeline = Pipeline {
            registry: Arc::new(Registry::new().register(Arc::new(cancelling))),
            options: Options { concurrency: NonZeroUsize::MIN, ..Options::new(fixture.library.path()) },
            ..fixture.pipeline()
        };

        let error = pipeline.run(Stores::open(fixture.cache.path(), false), &cancel).await.unwrap_err();

        assert_eq!(*error.deref(), ErrorKind::Interrupted);
        // One job at a time: the first two results were committed before the
        // third extraction cancelled the run.
        let cache = MetadataCache::load(fixture.cache.path().join(METADATA_CACHE_FILE));
        let library = std::fs::canonicalize(fixture.library.path()).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(library.join("a.epub")).unwrap().record.title.as_deref(), Some("Alpha"));
        assert_eq!(cache.get(library.join("b.pdf")).unwrap().record.title.as_deref(), Some("Beta"));

        let report = fixture.run().await.unwrap();
        assert_eq!((report.stats.cached, report.stats.extracted), (2, 3));
        assert_eq!(fixture.extractions(), 6);
        assert_eq!(report.catalog.len(), 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_removed_documents_are_forgotten() {
        let fixture = Fixture::new(&[("a.epub", "Alpha|Ann|"), ("b.pdf", "Beta|Ben|")]);
        fixture.run().await.unwrap();
        std::fs::remove_file(fixture.library.path().join("b.pdf")).unwrap();

        let report = fixture.run().await.unwrap();

        assert_eq!(report.catalog.entries.keys().collect::<Vec<_>>(), ["a.epub"]);
        let cache = MetadataCache::load(fixture.cache.path().join(METADATA_CACHE_FILE));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(report.library.join("a.epub")).is_some());
    }

    #[test]
    fn test_dropped_stores_are_saved() {
        let cache = tempfile::tempdir().unwrap();
        {
            let mut stores = Stores::open(cache.path(), false);
            stores.publishers.insert("Apress L.P.", "Apress");
        }
        let publishers = PublisherCache::load(cache.path().join(PUBLISHER_CACHE_FILE));
        assert_eq!(publishers.get("Apress L.P."), Some("Apress"));

        let reset = Stores::open(cache.path(), true);
        assert!(reset.publishers.is_empty());
    }

    #[tokio::test]
    async fn test_missing_library_is_an_error() {
        let cache = tempfile::tempdir().unwrap();
        let options = Options::new(cache.path().join("nowhere"));
        let pipeline = Pipeline::new(Arc::new(Registry::new()), Resolver::new(RuleTable::default()), options);

        let error = pipeline.run(Stores::open(cache.path(), false), &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(error.deref(), ErrorKind::Library(_)));
    }
}
