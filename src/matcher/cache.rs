//! Build-once cache of sensitive-word matchers.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

use super::{MatchMode, PatternMatcher, WordSource};
use crate::error::Result;

type CacheKey = (String, String, MatchMode);

/// Matchers keyed by `(source, version, mode)`.
///
/// Concurrent first callers for one key await the same cell, so the word
/// list is loaded and the automaton built once. A failed build leaves the
/// cell empty and the next caller retries.
#[derive(Debug, Default)]
pub struct MatcherCache {
    cells: DashMap<CacheKey, Arc<OnceCell<Arc<PatternMatcher>>>>,
}

impl MatcherCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the matcher for `(source, version, mode)`, building it on first use.
    pub async fn get_or_build(
        &self,
        source: &str,
        version: &str,
        mode: MatchMode,
        words: &dyn WordSource,
    ) -> Result<Arc<PatternMatcher>> {
        // Clone the cell out so the shard lock is released before awaiting.
        let cell = self
            .cells
            .entry((source.to_string(), version.to_string(), mode))
            .or_default()
            .clone();

        let matcher = cell
            .get_or_try_init(|| async {
                let list = words.load(source).await?;
                tracing::info!(source, version, ?mode, words = list.len(), "Loading sensitive words");
                Ok::<_, crate::error::GuardError>(Arc::new(PatternMatcher::from_words(list, mode)))
            })
            .await?;

        Ok(Arc::clone(matcher))
    }

    /// Drop every cached version of `source`.
    pub fn invalidate(&self, source: &str) {
        self.cells.retain(|(cached, _, _), _| cached != source);
    }

    /// Number of cached keys, built or pending.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::GuardError;

    struct CountingSource {
        loads: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl WordSource for CountingSource {
        async fn load(&self, source: &str) -> Result<Vec<String>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.fail {
                return Err(GuardError::PatternBuild {
                    source_key: source.to_string(),
                    message: "boom".to_string(),
                });
            }
            Ok(vec!["bad".to_string()])
        }
    }

    #[tokio::test]
    async fn test_builds_once_under_concurrency() {
        let cache = Arc::new(MatcherCache::new());
        let source = Arc::new(CountingSource {
            loads: AtomicUsize::new(0),
            fail: false,
        });

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            let source = Arc::clone(&source);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_build("default", "v1", MatchMode::FirstPerPosition, source.as_ref())
                    .await
                    .unwrap()
            }));
        }

        let mut matchers = Vec::new();
        for handle in handles {
            matchers.push(handle.await.unwrap());
        }

        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        assert!(matchers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_versions_are_distinct_and_invalidate() {
        let cache = MatcherCache::new();
        let source = CountingSource {
            loads: AtomicUsize::new(0),
            fail: false,
        };

        let mode = MatchMode::FirstPerPosition;
        cache.get_or_build("default", "v1", mode, &source).await.unwrap();
        cache.get_or_build("default", "v2", mode, &source).await.unwrap();
        cache.get_or_build("other", "v1", mode, &source).await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 3);
        assert_eq!(cache.len(), 3);

        cache.invalidate("default");
        assert_eq!(cache.len(), 1);
        cache.get_or_build("default", "v1", mode, &source).await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_modes_are_cached_separately() {
        let cache = MatcherCache::new();
        let source = crate::matcher::StaticWordSource::new().with_list("default", ["he", "she", "hers"]);

        let first = cache
            .get_or_build("default", "1", MatchMode::FirstPerPosition, &source)
            .await
            .unwrap();
        let all = cache
            .get_or_build("default", "1", MatchMode::AllPerPosition, &source)
            .await
            .unwrap();

        assert_eq!(first.search("ushers"), vec!["she", "hers"]);
        assert_eq!(all.mode(), MatchMode::AllPerPosition);
        assert_eq!(all.search("ushers"), vec!["she", "he", "hers"]);
        assert_eq!(cache.len(), 2);

        cache.invalidate("default");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_failed_build_is_not_cached() {
        let cache = MatcherCache::new();
        let source = CountingSource {
            loads: AtomicUsize::new(0),
            fail: true,
        };

        let mode = MatchMode::FirstPerPosition;
        assert!(cache.get_or_build("default", "v1", mode, &source).await.is_err());
        assert!(cache.get_or_build("default", "v1", mode, &source).await.is_err());
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }
}
