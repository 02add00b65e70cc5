//! Bounded concurrent extraction on the blocking thread pool.

use crate::detect::fingerprint;
use crate::error::{Error, ErrorKind, Result};
use async_stream::stream;
use derive_more::Display;
use exn::ResultExt;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, Stream, StreamExt};
use shelf_cache::{Fingerprint, FingerprintStrategy};
use shelf_extract::{Record, Registry};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::{JoinError, spawn_blocking};

/// How far through a batch of jobs we are.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[display("{completed}/{total}")]
pub struct Progress {
    pub completed: u64,
    pub total: u64,
}

/// Runs `jobs` on the blocking thread pool, at most `limit` at a time, and
/// streams each job's key with its outcome in completion order.
///
/// Jobs are started in the order given; another is started as each one
/// finishes. A job that panics surfaces as a [`JoinError`]. Dropping the
/// stream abandons the jobs still running: they run to completion on their
/// threads but nobody sees the result.
pub(crate) fn blocking<K, T, F>(
    jobs: impl IntoIterator<Item = (K, F)>,
    limit: NonZeroUsize,
) -> impl Stream<Item = (K, std::result::Result<T, JoinError>)>
where
    K: Send + 'static,
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let mut pending = jobs.into_iter();
    let start = |(key, job): (K, F)| spawn_blocking(job).map(move |result| (key, result));
    stream! {
        let mut running = FuturesUnordered::new();
        running.extend(pending.by_ref().take(limit.get()).map(start));
        while let Some(done) = running.next().await {
            yield done;
            if let Some(job) = pending.next() {
                running.push(start(job));
            }
        }
    }
}

/// Progress events emitted by [`extract_all`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started), exactly once, with the number of files.
/// 2. [`Extracted`](Self::Extracted) or [`Failed`](Self::Failed), exactly once
///    per file, in completion order.
/// 3. [`Complete`](Self::Complete), exactly once.
#[derive(Debug)]
pub enum ExtractionEvent {
    Started(u64),
    /// The file's fingerprint was taken immediately before it was parsed.
    Extracted {
        path: PathBuf,
        fingerprint: Fingerprint,
        record: Record,
        progress: Progress,
    },
    /// Fingerprinting or parsing failed, or the job panicked. The error is
    /// always [`ErrorKind::Extract`] and has already been logged.
    Failed {
        path: PathBuf,
        error: Error,
        progress: Progress,
    },
    Complete,
}
impl ExtractionEvent {
    pub fn progress(&self) -> Option<Progress> {
        match self {
            Self::Extracted { progress, .. } | Self::Failed { progress, .. } => Some(*progress),
            _ => None,
        }
    }
}

/// Extracts every file in `files` with at most `concurrency` extractions in
/// flight.
///
/// Jobs share nothing but the read-only `registry`; every result is handed
/// back through the stream, and it is up to the consumer to commit it.
pub fn extract_all(
    registry: Arc<Registry>,
    files: Vec<PathBuf>,
    strategy: FingerprintStrategy,
    concurrency: NonZeroUsize,
) -> impl Stream<Item = ExtractionEvent> {
    let total = files.len() as u64;
    let jobs = files.into_iter().map(move |path| {
        let registry = Arc::clone(&registry);
        let job_path = path.clone();
        let job = move || -> Result<(Fingerprint, Record)> {
            let failed = || ErrorKind::Extract(job_path.clone());
            let fingerprint = fingerprint(&job_path, strategy).or_raise(failed)?;
            let record = registry.extract(&job_path).or_raise(failed)?;
            Ok((fingerprint, record))
        };
        (path, job)
    });
    stream! {
        yield ExtractionEvent::Started(total);
        let mut completed = 0;
        for await (path, result) in blocking(jobs, concurrency) {
            completed += 1;
            let progress = Progress { completed, total };
            let outcome = result.or_raise(|| ErrorKind::Extract(path.clone())).and_then(|outcome| outcome);
            match outcome {
                Ok((fingerprint, record)) => {
                    tracing::debug!(path = %path.display(), %progress, "Extracted metadata");
                    yield ExtractionEvent::Extracted { path, fingerprint, record, progress };
                },
                Err(error) => {
                    tracing::warn!(path = %path.display(), %progress, "Unable to extract metadata: {error:?}");
                    yield ExtractionEvent::Failed { path, error, progress };
                },
            }
        }
        yield ExtractionEvent::Complete;
    }
}
