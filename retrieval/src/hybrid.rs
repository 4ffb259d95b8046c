//! Hybrid candidate retrieval.
//!
//! Semantic hits for the question and each of its variants come first, in
//! distance order per query. Chunks containing an extracted keyword follow in
//! corpus order. The concatenation is deduplicated by exact text, first
//! occurrence winning, and capped.

use std::collections::HashSet;
use std::iter;

use lexrag_embeddings::Embedder;
use tracing::debug;

use crate::error::Result;
use crate::store::CategoryStore;

/// Ordered, duplicate-free candidate texts for one question.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet(Vec<String>);

impl CandidateSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl IntoIterator for CandidateSet {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Concatenate `semantic` then `keyword` hits, drop repeated texts and keep
/// at most `max_candidates`.
pub fn fuse(semantic: Vec<String>, keyword: Vec<String>, max_candidates: usize) -> CandidateSet {
    let mut seen = HashSet::new();
    let fused = semantic
        .into_iter()
        .chain(keyword)
        .filter(|text| seen.insert(text.clone()))
        .take(max_candidates)
        .collect();
    CandidateSet(fused)
}

/// Texts containing at least one keyword, case-insensitively, in corpus
/// order. Blank keywords are ignored.
pub fn keyword_matches(texts: &[String], keywords: &[String]) -> Vec<String> {
    let needles: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    if needles.is_empty() {
        return Vec::new();
    }

    texts
        .iter()
        .filter(|text| {
            let haystack = text.to_lowercase();
            needles.iter().any(|needle| haystack.contains(needle.as_str()))
        })
        .cloned()
        .collect()
}

/// Proposes the candidate pool handed to the reranker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HybridRetriever {
    per_query_k: usize,
    max_candidates: usize,
}

impl HybridRetriever {
    pub fn new(per_query_k: usize, max_candidates: usize) -> Self {
        Self {
            per_query_k,
            max_candidates,
        }
    }

    pub fn per_query_k(&self) -> usize {
        self.per_query_k
    }

    pub fn max_candidates(&self) -> usize {
        self.max_candidates
    }

    /// Gather and fuse candidates for `question` in `category`.
    ///
    /// Both phases read the same index snapshot, so an update landing midway
    /// does not mix old and new chunks.
    pub async fn candidates(
        &self,
        store: &CategoryStore,
        embedder: &dyn Embedder,
        category: &str,
        question: &str,
        variants: &[String],
        keywords: &[String],
    ) -> Result<CandidateSet> {
        let index = store.ensure_loaded(category).await?;

        let mut semantic = Vec::new();
        for query in iter::once(question).chain(variants.iter().map(String::as_str)) {
            let vector = embedder.embed_query(query).await?;
            let hits = index.search(&vector, self.per_query_k)?;
            debug!("{} semantic hits for {query:?}", hits.len());
            semantic.extend(hits.into_iter().map(|hit| hit.text));
        }

        let keyword = keyword_matches(index.texts(), keywords);
        debug!("{} keyword hits for {keywords:?}", keyword.len());

        let fused = fuse(semantic, keyword, self.max_candidates);
        debug!("Fused {} candidates for '{category}'", fused.len());
        Ok(fused)
    }
}

impl Default for HybridRetriever {
    fn default() -> Self {
        Self::new(7, 40)
    }
}
