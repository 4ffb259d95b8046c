//! Retrieval pipeline: question in, ranked chunks out.

use std::sync::Arc;

use lexrag_embeddings::{
    CachedEmbedder, Embedder, HashEmbedder, HttpReranker, InputFraming, OpenAIEmbedder,
    PassthroughReranker, Reranker,
};
use lexrag_index::Category;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{
    EmbeddingProviderType, ExpansionProviderType, RerankProviderType, RetrievalConfig,
};
use crate::corpus::DirectoryCorpus;
use crate::error::{Result, RetrievalError};
use crate::expander::{ChatExpander, Expansion, NoExpansion, QueryExpander};
use crate::hybrid::HybridRetriever;
use crate::store::CategoryStore;

/// Outcome of one retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retrieval {
    pub category: String,

    /// Paraphrases searched alongside the question.
    pub variants: Vec<String>,

    /// Keywords used for the lexical scan.
    pub keywords: Vec<String>,

    /// Size of the fused pool before reranking.
    pub candidate_count: usize,

    /// Reranked chunks, most relevant first.
    pub chunks: Vec<String>,
}

/// Coordinates the store, embedder, expander and reranker for each question.
///
/// One pipeline is shared by every request; the store inside it is the only
/// registry of category indexes.
pub struct RetrievalPipeline {
    store: Arc<CategoryStore>,
    embedder: Arc<dyn Embedder>,
    reranker: Arc<dyn Reranker>,
    expander: Arc<dyn QueryExpander>,
    retriever: HybridRetriever,
    top_n: usize,
}

impl RetrievalPipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> RetrievalPipelineBuilder {
        RetrievalPipelineBuilder::new()
    }

    /// Assemble a pipeline from configuration. API keys are read from the
    /// environment variables the configuration names.
    pub fn from_config(config: &RetrievalConfig) -> Result<Self> {
        config.validate()?;

        let embedder = embedder_from_config(config);
        let corpus = DirectoryCorpus::new(&config.data_root, Arc::clone(&embedder));
        let store = CategoryStore::new(&config.persist_root, config.embedding.dimension)
            .with_builder(Arc::new(corpus));

        let reranker: Arc<dyn Reranker> = match config.rerank.provider {
            RerankProviderType::Http => {
                let mut reranker = HttpReranker::new(&config.rerank.base_url);
                if let Some(model) = &config.rerank.model {
                    reranker = reranker.with_model(model);
                }
                Arc::new(reranker)
            }
            RerankProviderType::Passthrough => Arc::new(PassthroughReranker),
        };

        let expander: Arc<dyn QueryExpander> = match config.expansion.provider {
            ExpansionProviderType::Chat => {
                let mut expander =
                    ChatExpander::new(&config.expansion.base_url, &config.expansion.model)
                        .with_max_variants(config.expansion.max_variants);
                if let Some(key) = env_key(config.expansion.api_key_env.as_deref()) {
                    expander = expander.with_api_key(key);
                }
                Arc::new(expander)
            }
            ExpansionProviderType::None => Arc::new(NoExpansion),
        };

        info!(
            "Retrieval pipeline: embedder={}, reranker={}, expander={}",
            embedder.name(),
            reranker.name(),
            expander.name()
        );

        Self::builder()
            .with_store(Arc::new(store))
            .with_embedder(embedder)
            .with_reranker(reranker)
            .with_expander(expander)
            .with_retriever(HybridRetriever::new(
                config.query.per_query_k,
                config.query.max_candidates,
            ))
            .with_top_n(config.query.top_n)
            .build()
    }

    pub fn store(&self) -> &Arc<CategoryStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Retrieve the chunks of `category` most relevant to `question`.
    ///
    /// An expander failure degrades to searching the question alone; every
    /// other failure is returned.
    pub async fn retrieve(&self, category: &str, question: &str) -> Result<Retrieval> {
        let category = Category::new(category)?;
        let question = question.trim();
        if question.is_empty() {
            return Err(RetrievalError::EmptyQuestion);
        }

        self.store.ensure_loaded(category.as_str()).await?;

        let expansion = match self.expander.expand(question).await {
            Ok(expansion) => expansion,
            Err(e) => {
                warn!("Query expansion failed, searching the question alone: {e}");
                Expansion::default()
            }
        };

        let candidates = self
            .retriever
            .candidates(
                &self.store,
                self.embedder.as_ref(),
                category.as_str(),
                question,
                &expansion.variants,
                &expansion.keywords,
            )
            .await?;
        let candidate_count = candidates.len();

        let chunks = lexrag_embeddings::rerank(
            self.reranker.as_ref(),
            question,
            candidates.into_vec(),
            self.top_n,
        )
        .await?;

        debug!(
            "Retrieved {} of {candidate_count} candidates for '{category}'",
            chunks.len()
        );
        Ok(Retrieval {
            category: category.to_string(),
            variants: expansion.variants,
            keywords: expansion.keywords,
            candidate_count,
            chunks,
        })
    }
}

/// Build the configured embedder, wrapped in a query cache when enabled.
pub fn embedder_from_config(config: &RetrievalConfig) -> Arc<dyn Embedder> {
    let settings = &config.embedding;
    let embedder: Arc<dyn Embedder> = match settings.provider {
        EmbeddingProviderType::OpenAI => {
            let mut embedder = OpenAIEmbedder::new(&settings.model, settings.dimension)
                .with_base_url(&settings.base_url)
                .with_batch_size(settings.batch_size)
                .with_framing(InputFraming {
                    document_prefix: settings.document_prefix.clone(),
                    query_prefix: settings.query_prefix.clone(),
                });
            if let Some(key) = env_key(settings.api_key_env.as_deref()) {
                embedder = embedder.with_api_key(key);
            }
            Arc::new(embedder)
        }
        EmbeddingProviderType::Hash => Arc::new(HashEmbedder::new(settings.dimension)),
    };

    if settings.cache_enabled {
        Arc::new(CachedEmbedder::new(embedder, settings.cache_max_entries))
    } else {
        embedder
    }
}

fn env_key(name: Option<&str>) -> Option<String> {
    name.and_then(|name| std::env::var(name).ok())
        .filter(|key| !key.is_empty())
}

/// Builder for [`RetrievalPipeline`].
pub struct RetrievalPipelineBuilder {
    store: Option<Arc<CategoryStore>>,
    embedder: Option<Arc<dyn Embedder>>,
    reranker: Arc<dyn Reranker>,
    expander: Arc<dyn QueryExpander>,
    retriever: HybridRetriever,
    top_n: usize,
}

impl RetrievalPipelineBuilder {
    /// Create a new builder. Without further settings it keeps fusion order
    /// and does not expand questions.
    pub fn new() -> Self {
        Self {
            store: None,
            embedder: None,
            reranker: Arc::new(PassthroughReranker),
            expander: Arc::new(NoExpansion),
            retriever: HybridRetriever::default(),
            top_n: 10,
        }
    }

    pub fn with_store(mut self, store: Arc<CategoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = reranker;
        self
    }

    pub fn with_expander(mut self, expander: Arc<dyn QueryExpander>) -> Self {
        self.expander = expander;
        self
    }

    pub fn with_retriever(mut self, retriever: HybridRetriever) -> Self {
        self.retriever = retriever;
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    /// Build the pipeline.
    pub fn build(self) -> Result<RetrievalPipeline> {
        let store = self
            .store
            .ok_or_else(|| RetrievalError::Config("pipeline needs a category store".to_string()))?;
        let embedder = self
            .embedder
            .ok_or_else(|| RetrievalError::Config("pipeline needs an embedder".to_string()))?;
        if embedder.dimension() != store.dimension() {
            return Err(RetrievalError::Config(format!(
                "embedder dimension {} does not match store dimension {}",
                embedder.dimension(),
                store.dimension()
            )));
        }

        Ok(RetrievalPipeline {
            store,
            embedder,
            reranker: self.reranker,
            expander: self.expander,
            retriever: self.retriever,
            top_n: self.top_n,
        })
    }
}

impl Default for RetrievalPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
