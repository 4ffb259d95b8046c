//! Query embedding cache.
//!
//! Questions and their paraphrases repeat far more often than chunk texts,
//! which are embedded once per build. Only [`Embedder::embed_query`] results
//! are memoized.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::provider::Embedder;
use crate::Embedding;

#[derive(Debug, Clone)]
struct CacheEntry {
    embedding: Embedding,
    inserted: u64,
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// An [`Embedder`] that memoizes query embeddings of the one it wraps.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: RwLock<HashMap<String, CacheEntry>>,
    max_entries: usize,
    sequence: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedEmbedder {
    /// Wrap `inner`, keeping at most `max_entries` queries. Zero is treated
    /// as one.
    pub fn new(inner: Arc<dyn Embedder>, max_entries: usize) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
            sequence: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cache.read().await.len(),
            max_entries: self.max_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Clear the entire cache.
    pub async fn clear(&self) {
        self.cache.write().await.clear();
        debug!("Cleared query embedding cache");
    }

    async fn put(&self, text: &str, embedding: Embedding) {
        let mut cache = self.cache.write().await;

        // Evict if at capacity
        if cache.len() >= self.max_entries && !cache.contains_key(text) {
            let oldest_key = cache
                .iter()
                .min_by_key(|(_, v)| v.inserted)
                .map(|(k, _)| k.clone());
            if let Some(oldest_key) = oldest_key {
                cache.remove(&oldest_key);
            }
        }

        let inserted = self.sequence.fetch_add(1, Ordering::Relaxed);
        cache.insert(
            text.to_string(),
            CacheEntry {
                embedding,
                inserted,
            },
        );
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.inner.embed_documents(texts).await
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        if let Some(entry) = self.cache.read().await.get(text) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Query embedding cache hit");
            return Ok(entry.embedding.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let embedding = self.inner.embed_query(text).await?;
        self.put(text, embedding.clone()).await;
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    struct CountingEmbedder {
        queries: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn name(&self) -> &str {
            "counting"
        }

        fn dimension(&self) -> usize {
            1
        }

        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }

        async fn embed_query(&self, text: &str) -> Result<Embedding> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32])
        }
    }

    fn counting() -> Arc<CountingEmbedder> {
        Arc::new(CountingEmbedder {
            queries: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_repeated_query_hits_cache() {
        let inner = counting();
        let cached = CachedEmbedder::new(inner.clone(), 8);

        assert_eq!(cached.embed_query("lease").await.unwrap(), vec![5.0]);
        assert_eq!(cached.embed_query("lease").await.unwrap(), vec![5.0]);

        assert_eq!(inner.queries.load(Ordering::SeqCst), 1);
        let stats = cached.stats().await;
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_oldest_entry_is_evicted() {
        let inner = counting();
        let cached = CachedEmbedder::new(inner.clone(), 2);

        cached.embed_query("a").await.unwrap();
        cached.embed_query("bb").await.unwrap();
        cached.embed_query("ccc").await.unwrap();
        assert_eq!(cached.stats().await.entries, 2);

        cached.embed_query("bb").await.unwrap();
        assert_eq!(inner.queries.load(Ordering::SeqCst), 3);
        cached.embed_query("a").await.unwrap();
        assert_eq!(inner.queries.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_documents_bypass_cache() {
        let inner = counting();
        let cached = CachedEmbedder::new(inner, 2);

        let texts = vec!["x".to_string(), "yy".to_string()];
        assert_eq!(
            cached.embed_documents(&texts).await.unwrap(),
            vec![vec![1.0], vec![2.0]]
        );
        assert_eq!(cached.stats().await.entries, 0);
    }
}
