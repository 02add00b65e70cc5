use crate::error::{ErrorKind, Result};
use crate::normalizer::Normalizer;
use crate::rules::RuleTable;
use derive_more::Display;
use futures::{StreamExt, stream};
use shelf_cache::PublisherCache;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

pub const DEFAULT_CHUNK_SIZE: usize = 50;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 1;

/// How each distinct name of a run was settled.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq)]
#[display(
    "{cached} cached, {rules} by rule, {external} external, {unresolved} unresolved \
     ({skipped} skipped, {failed_chunks} failed chunks)"
)]
pub struct ResolutionStats {
    pub cached: usize,
    pub rules: usize,
    pub external: usize,
    /// Names left as they were, for any reason.
    pub unresolved: usize,
    /// Unresolved names that were never sent because no external normalizer
    /// is configured.
    pub skipped: usize,
    pub failed_chunks: usize,
}

/// Raw publisher name → canonical name, for every name that was resolved
/// this run. Anything missing stays as it is.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub names: HashMap<String, String>,
    pub stats: ResolutionStats,
}
impl Resolution {
    pub fn canonical<'a>(&'a self, raw: &'a str) -> &'a str {
        self.names.get(raw).map_or(raw, String::as_str)
    }
}

/// Resolves publisher names through three tiers, cheapest first:
///
/// 1. The [`PublisherCache`].
/// 2. The [`RuleTable`]; matches are written back to the cache.
/// 3. An optional external [`Normalizer`], called once per chunk of the
///    remaining names; successful answers are written back to the cache.
///
/// A name that no tier resolves keeps its raw value and is never cached, so
/// the next run gets another chance at it.
pub struct Resolver {
    rules: RuleTable,
    normalizer: Option<Arc<dyn Normalizer>>,
    chunk_size: usize,
    max_in_flight: usize,
}
impl Resolver {
    pub fn new(rules: RuleTable) -> Self {
        Self { rules, normalizer: None, chunk_size: DEFAULT_CHUNK_SIZE, max_in_flight: DEFAULT_MAX_IN_FLIGHT }
    }

    pub fn with_normalizer(mut self, normalizer: impl Into<Option<Arc<dyn Normalizer>>>) -> Self {
        self.normalizer = normalizer.into();
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Resolves every distinct, non-blank name in `names`.
    ///
    /// Cancellation stops further chunks from being sent and returns
    /// [`ErrorKind::Interrupted`]; whatever was resolved before that is
    /// already in `cache`.
    #[instrument(skip_all)]
    pub async fn resolve<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
        cache: &mut PublisherCache,
        cancel: &CancellationToken,
    ) -> Result<Resolution> {
        let distinct: BTreeSet<&str> = names.into_iter().filter(|name| !name.trim().is_empty()).collect();
        let mut resolution = Resolution::default();
        let mut pending: Vec<String> = Vec::new();

        for &name in &distinct {
            if let Some(canonical) = cache.get(name) {
                resolution.names.insert(name.to_string(), canonical.to_string());
                resolution.stats.cached += 1;
            } else if let Some(canonical) = self.rules.find(name) {
                tracing::debug!(raw = name, canonical, "Publisher matched by rule");
                cache.insert(name, canonical);
                resolution.names.insert(name.to_string(), canonical.to_string());
                resolution.stats.rules += 1;
            } else {
                pending.push(name.to_string());
            }
        }

        match &self.normalizer {
            _ if pending.is_empty() => {},
            None => {
                tracing::info!(names = pending.len(), "No external normalizer configured; leaving names as they are");
                resolution.stats.skipped = pending.len();
                resolution.stats.unresolved = pending.len();
            },
            Some(normalizer) => {
                self.resolve_external(normalizer.as_ref(), &pending, &mut resolution, cache, cancel).await?;
            },
        }

        tracing::info!(distinct = distinct.len(), "Resolved publishers: {}", resolution.stats);
        Ok(resolution)
    }

    async fn resolve_external(
        &self,
        normalizer: &dyn Normalizer,
        pending: &[String],
        resolution: &mut Resolution,
        cache: &mut PublisherCache,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let chunks = pending.chunks(self.chunk_size);
        tracing::info!(names = pending.len(), chunks = chunks.len(), "Sending publishers to external normalizer");
        let mut requests = stream::iter(chunks)
            .map(|chunk| async move { (chunk, normalizer.normalize(chunk).await) })
            .buffer_unordered(self.max_in_flight);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => exn::bail!(ErrorKind::Interrupted),
                next = requests.next() => next,
            };
            let Some((chunk, result)) = next else { break };
            let mapping = match result {
                Ok(mapping) => mapping,
                Err(error) => {
                    tracing::warn!(names = chunk.len(), "External normalization failed for chunk: {error:?}");
                    resolution.stats.failed_chunks += 1;
                    resolution.stats.unresolved += chunk.len();
                    continue;
                },
            };
            for raw in chunk {
                match mapping.get(raw).map(|canonical| canonical.trim()).filter(|canonical| !canonical.is_empty()) {
                    Some(canonical) => {
                        cache.insert(raw.as_str(), canonical);
                        resolution.names.insert(raw.clone(), canonical.to_string());
                        resolution.stats.external += 1;
                    },
                    None => {
                        tracing::debug!(raw = raw.as_str(), "External normalizer gave no answer");
                        resolution.stats.unresolved += 1;
                    },
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Rule;
    use async_trait::async_trait;
    use std::ops::Deref;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers every name with an upper-cased canonical, except for chunks
    /// containing a poisoned name, which fail outright.
    #[derive(Default)]
    struct ScriptedNormalizer {
        calls: Mutex<Vec<Vec<String>>>,
        poisoned: Option<&'static str>,
        omitted: Option<&'static str>,
        delay: Option<Duration>,
    }
    #[async_trait]
    impl Normalizer for ScriptedNormalizer {
        async fn normalize(&self, names: &[String]) -> Result<HashMap<String, String>> {
            self.calls.lock().unwrap().push(names.to_vec());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if names.iter().any(|name| Some(name.as_str()) == self.poisoned) {
                exn::bail!(ErrorKind::Status(500));
            }
            Ok(names
                .iter()
                .filter(|name| Some(name.as_str()) != self.omitted)
                .map(|name| (name.clone(), name.to_uppercase()))
                .collect())
        }
    }
    impl ScriptedNormalizer {
        fn sent(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().flatten().cloned().collect()
        }
    }

    fn cache() -> (tempfile::TempDir, PublisherCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = PublisherCache::load(dir.path().join("publisher_cache.json"));
        (dir, cache)
    }

    fn rules() -> RuleTable {
        RuleTable::new([
            Rule::new("O'Reilly", ["reilly"]),
            Rule::new("O'Reilly Media", ["o'reilly media"]),
            Rule::new("Packt Publishing", ["packt"]),
        ])
    }

    #[tokio::test]
    async fn test_tiers_are_consulted_cheapest_first() {
        let (_dir, mut cache) = cache();
        cache.insert("Packt Publishing Ltd", "Packt (cached)");
        let normalizer = Arc::new(ScriptedNormalizer::default());
        let resolver = Resolver::new(rules()).with_normalizer(normalizer.clone() as Arc<dyn Normalizer>);

        let names = ["Packt Publishing Ltd", "O'Reilly Media, Inc.", "no starch press", "no starch press", ""];
        let resolution = resolver.resolve(names, &mut cache, &CancellationToken::new()).await.unwrap();

        // Cache beats rules, rules beat the external fallback.
        assert_eq!(resolution.canonical("Packt Publishing Ltd"), "Packt (cached)");
        assert_eq!(resolution.canonical("O'Reilly Media, Inc."), "O'Reilly Media");
        assert_eq!(resolution.canonical("no starch press"), "NO STARCH PRESS");
        assert_eq!(normalizer.sent(), vec!["no starch press"]);
        assert_eq!(
            resolution.stats,
            ResolutionStats { cached: 1, rules: 1, external: 1, ..Default::default() }
        );
        // Rule and external answers are remembered.
        assert_eq!(cache.get("O'Reilly Media, Inc."), Some("O'Reilly Media"));
        assert_eq!(cache.get("no starch press"), Some("NO STARCH PRESS"));
    }

    #[tokio::test]
    async fn test_second_run_is_served_from_cache() {
        let (_dir, mut cache) = cache();
        let normalizer = Arc::new(ScriptedNormalizer::default());
        let resolver = Resolver::new(rules()).with_normalizer(normalizer.clone() as Arc<dyn Normalizer>);
        let names = ["Manning", "Packt"];

        resolver.resolve(names, &mut cache, &CancellationToken::new()).await.unwrap();
        let second = resolver.resolve(names, &mut cache, &CancellationToken::new()).await.unwrap();

        assert_eq!(normalizer.calls.lock().unwrap().len(), 1);
        assert_eq!(second.stats, ResolutionStats { cached: 2, ..Default::default() });
    }

    #[tokio::test]
    async fn test_failed_chunk_leaves_other_chunks_intact() {
        let (_dir, mut cache) = cache();
        let normalizer = Arc::new(ScriptedNormalizer { poisoned: Some("c"), ..Default::default() });
        let resolver = Resolver::new(RuleTable::default())
            .with_normalizer(normalizer.clone() as Arc<dyn Normalizer>)
            .with_chunk_size(2);

        let resolution = resolver.resolve(["e", "d", "c", "b", "a"], &mut cache, &CancellationToken::new()).await.unwrap();

        // Sorted before chunking: [a, b], [c, d], [e].
        assert_eq!(*normalizer.calls.lock().unwrap(), vec![vec!["a", "b"], vec!["c", "d"], vec!["e"]]);
        assert_eq!(resolution.canonical("a"), "A");
        assert_eq!(resolution.canonical("c"), "c");
        assert_eq!(resolution.canonical("d"), "d");
        assert_eq!(resolution.canonical("e"), "E");
        assert_eq!(
            resolution.stats,
            ResolutionStats { external: 3, unresolved: 2, failed_chunks: 1, ..Default::default() }
        );
        assert!(!cache.contains("c"));
        assert!(!cache.contains("d"));
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test]
    async fn test_omitted_names_are_not_cached() {
        let (_dir, mut cache) = cache();
        let normalizer = Arc::new(ScriptedNormalizer { omitted: Some("pdfTeX"), ..Default::default() });
        let resolver = Resolver::new(RuleTable::default()).with_normalizer(normalizer as Arc<dyn Normalizer>);

        let resolution = resolver.resolve(["pdfTeX", "Apress"], &mut cache, &CancellationToken::new()).await.unwrap();

        assert_eq!(resolution.canonical("pdfTeX"), "pdfTeX");
        assert_eq!(resolution.stats.unresolved, 1);
        assert!(!cache.contains("pdfTeX"));
        assert!(cache.contains("Apress"));
    }

    #[tokio::test]
    async fn test_without_normalizer_names_are_skipped() {
        let (_dir, mut cache) = cache();
        let resolver = Resolver::new(rules());

        let resolution = resolver.resolve(["Packt", "Apress"], &mut cache, &CancellationToken::new()).await.unwrap();

        assert_eq!(resolution.canonical("Apress"), "Apress");
        assert_eq!(
            resolution.stats,
            ResolutionStats { rules: 1, unresolved: 1, skipped: 1, ..Default::default() }
        );
        assert!(!cache.contains("Apress"));
    }

    #[tokio::test]
    async fn test_parallel_chunks_never_share_a_name() {
        let (_dir, mut cache) = cache();
        let normalizer = Arc::new(ScriptedNormalizer { delay: Some(Duration::from_millis(5)), ..Default::default() });
        let resolver = Resolver::new(RuleTable::default())
            .with_normalizer(normalizer.clone() as Arc<dyn Normalizer>)
            .with_chunk_size(3)
            .with_max_in_flight(4);
        let names: Vec<String> = (0..20).map(|i| format!("publisher {i:02}")).collect();

        let resolution = resolver
            .resolve(names.iter().chain(names.iter()).map(String::as_str), &mut cache, &CancellationToken::new())
            .await
            .unwrap();

        let mut sent = normalizer.sent();
        sent.sort();
        assert_eq!(sent, names);
        assert_eq!(resolution.stats.external, 20);
        assert_eq!(cache.len(), 20);
    }

    #[tokio::test]
    async fn test_cancellation_stops_sending_chunks() {
        let (_dir, mut cache) = cache();
        let normalizer = Arc::new(ScriptedNormalizer::default());
        let resolver = Resolver::new(rules()).with_normalizer(normalizer.clone() as Arc<dyn Normalizer>);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let error = resolver.resolve(["Packt", "Apress"], &mut cache, &cancel).await.unwrap_err();

        assert_eq!(*error.deref(), ErrorKind::Interrupted);
        assert!(normalizer.calls.lock().unwrap().is_empty());
        // Work done before the interruption is kept.
        assert_eq!(cache.get("Packt"), Some("Packt Publishing"));
    }
}
