//! Question to ranked chunks, through expansion, fusion and reranking.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use lexrag_embeddings::{Embedder, HashEmbedder, Reranker};
use lexrag_index::IndexError;
use lexrag_retrieval::config::{
    EmbeddingConfig, EmbeddingProviderType, QueryConfig, RerankConfig, RerankProviderType,
};
use lexrag_retrieval::{
    CategoryStore, DirectoryCorpus, Expansion, HybridRetriever, QueryExpander, RetrievalConfig,
    RetrievalError, RetrievalPipeline,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const DIM: usize = 32;

struct FixedExpander(Expansion);

#[async_trait]
impl QueryExpander for FixedExpander {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn expand(&self, _question: &str) -> lexrag_retrieval::Result<Expansion> {
        Ok(self.0.clone())
    }
}

struct BrokenExpander;

#[async_trait]
impl QueryExpander for BrokenExpander {
    fn name(&self) -> &str {
        "broken"
    }

    async fn expand(&self, _question: &str) -> lexrag_retrieval::Result<Expansion> {
        Err(RetrievalError::Expansion("model unavailable".to_string()))
    }
}

/// Prefers shorter passages.
struct ShortestFirst;

#[async_trait]
impl Reranker for ShortestFirst {
    fn name(&self) -> &str {
        "shortest"
    }

    async fn score(&self, _query: &str, candidate: &str) -> lexrag_embeddings::Result<f32> {
        Ok(-(candidate.len() as f32))
    }
}

fn write_corpus(data_root: &Path) {
    let dir = data_root.join("land_law");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("land_law.txt"),
        "Article 1: lease of land\n\n\
         Article 2: taxes on goods and services\n\n\
         Article 9: penalties for unlawful occupation\n",
    )
    .unwrap();
}

fn pipeline(temp_dir: &TempDir, expander: Arc<dyn QueryExpander>) -> RetrievalPipeline {
    let data_root = temp_dir.path().join("data");
    write_corpus(&data_root);

    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(DIM));
    let corpus = DirectoryCorpus::new(&data_root, Arc::clone(&embedder));
    let store =
        CategoryStore::new(temp_dir.path().join("store"), DIM).with_builder(Arc::new(corpus));

    RetrievalPipeline::builder()
        .with_store(Arc::new(store))
        .with_embedder(embedder)
        .with_expander(expander)
        .with_retriever(HybridRetriever::new(1, 40))
        .build()
        .unwrap()
}

#[tokio::test]
async fn keyword_hits_backfill_semantic_hits() {
    let temp_dir = TempDir::new().unwrap();
    let expander = Arc::new(FixedExpander(Expansion {
        variants: Vec::new(),
        keywords: vec!["ARTICLE 9".to_string(), "  ".to_string()],
    }));
    let pipeline = pipeline(&temp_dir, expander);

    let retrieval = pipeline
        .retrieve("land_law", "Article 1: lease of land")
        .await
        .unwrap();

    assert_eq!(retrieval.category, "land_law");
    assert_eq!(retrieval.candidate_count, 2);
    assert_eq!(
        retrieval.chunks,
        vec![
            "Article 1: lease of land".to_string(),
            "Article 9: penalties for unlawful occupation".to_string(),
        ]
    );
    assert!(pipeline.store().is_resident("land_law").await);
}

#[tokio::test]
async fn variants_widen_the_semantic_pool_without_duplicates() {
    let temp_dir = TempDir::new().unwrap();
    let expander = Arc::new(FixedExpander(Expansion {
        variants: vec![
            "Article 2: taxes on goods and services".to_string(),
            "Article 1: lease of land".to_string(),
        ],
        keywords: vec!["lease".to_string()],
    }));
    let pipeline = pipeline(&temp_dir, expander);

    let retrieval = pipeline
        .retrieve("land_law", "Article 1: lease of land")
        .await
        .unwrap();

    assert_eq!(
        retrieval.chunks,
        vec![
            "Article 1: lease of land".to_string(),
            "Article 2: taxes on goods and services".to_string(),
        ]
    );
    assert_eq!(retrieval.variants.len(), 2);
}

#[tokio::test]
async fn reranker_orders_and_truncates() {
    let temp_dir = TempDir::new().unwrap();
    let expander = Arc::new(FixedExpander(Expansion {
        variants: Vec::new(),
        keywords: vec!["article".to_string()],
    }));
    let data_root = temp_dir.path().join("data");
    write_corpus(&data_root);

    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(DIM));
    let corpus = DirectoryCorpus::new(&data_root, Arc::clone(&embedder));
    let store =
        CategoryStore::new(temp_dir.path().join("store"), DIM).with_builder(Arc::new(corpus));
    let pipeline = RetrievalPipeline::builder()
        .with_store(Arc::new(store))
        .with_embedder(embedder)
        .with_expander(expander)
        .with_reranker(Arc::new(ShortestFirst))
        .with_top_n(2)
        .build()
        .unwrap();

    let retrieval = pipeline
        .retrieve("land_law", "penalties for occupation")
        .await
        .unwrap();

    assert_eq!(retrieval.candidate_count, 3);
    assert_eq!(
        retrieval.chunks,
        vec![
            "Article 1: lease of land".to_string(),
            "Article 2: taxes on goods and services".to_string(),
        ]
    );
}

#[tokio::test]
async fn expander_failure_degrades_to_question_only() {
    let temp_dir = TempDir::new().unwrap();
    let pipeline = pipeline(&temp_dir, Arc::new(BrokenExpander));

    let retrieval = pipeline
        .retrieve("land_law", "Article 1: lease of land")
        .await
        .unwrap();

    assert!(retrieval.variants.is_empty());
    assert!(retrieval.keywords.is_empty());
    assert_eq!(retrieval.chunks, vec!["Article 1: lease of land".to_string()]);
}

#[tokio::test]
async fn bad_requests_are_client_errors() {
    let temp_dir = TempDir::new().unwrap();
    let pipeline = pipeline(&temp_dir, Arc::new(BrokenExpander));

    let err = pipeline.retrieve("land_law", "   ").await.unwrap_err();
    assert!(matches!(err, RetrievalError::EmptyQuestion));

    let err = pipeline.retrieve("../land_law", "q").await.unwrap_err();
    assert!(matches!(
        err,
        RetrievalError::Index(IndexError::InvalidCategory(_))
    ));
    assert!(err.is_client_error());
    assert!(!temp_dir.path().join("store").exists());
}

#[tokio::test]
async fn missing_source_directory_names_the_category() {
    let temp_dir = TempDir::new().unwrap();
    let pipeline = pipeline(&temp_dir, Arc::new(BrokenExpander));

    let err = pipeline.retrieve("tax_law", "q").await.unwrap_err();
    assert!(matches!(&err, RetrievalError::Build { category, .. } if category == "tax_law"));
    assert!(err.to_string().contains("source directory not found"));
}

#[tokio::test]
async fn pipeline_from_config_builds_on_first_query() {
    let temp_dir = TempDir::new().unwrap();
    let data_root = temp_dir.path().join("data");
    write_corpus(&data_root);

    let config = RetrievalConfig::new(temp_dir.path().join("store"))
        .with_data_root(&data_root)
        .with_embedding(EmbeddingConfig {
            provider: EmbeddingProviderType::Hash,
            dimension: DIM,
            ..EmbeddingConfig::default()
        })
        .with_rerank(RerankConfig {
            provider: RerankProviderType::Passthrough,
            ..RerankConfig::default()
        })
        .with_query(QueryConfig {
            per_query_k: 2,
            ..QueryConfig::default()
        });
    let pipeline = RetrievalPipeline::from_config(&config).unwrap();

    let retrieval = pipeline
        .retrieve("land_law", "Article 9: penalties for unlawful occupation")
        .await
        .unwrap();

    assert_eq!(retrieval.chunks.len(), 2);
    assert_eq!(
        retrieval.chunks[0],
        "Article 9: penalties for unlawful occupation"
    );
    assert!(temp_dir.path().join("store/land_law/index.json").is_file());
}
