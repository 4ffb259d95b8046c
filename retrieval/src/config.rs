//! Configuration for the retrieval pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};

/// Configuration for the retrieval pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Root under which each category's index directory lives.
    pub persist_root: PathBuf,

    /// Root of the source corpora, one subdirectory per category.
    pub data_root: PathBuf,

    /// Embedding provider configuration.
    pub embedding: EmbeddingConfig,

    /// Reranker configuration.
    pub rerank: RerankConfig,

    /// Query expansion configuration.
    pub expansion: ExpansionConfig,

    /// Query processing configuration.
    pub query: QueryConfig,
}

impl RetrievalConfig {
    /// Create a new configuration with default values.
    pub fn new(persist_root: impl Into<PathBuf>) -> Self {
        Self {
            persist_root: persist_root.into(),
            data_root: PathBuf::from("data"),
            embedding: EmbeddingConfig::default(),
            rerank: RerankConfig::default(),
            expansion: ExpansionConfig::default(),
            query: QueryConfig::default(),
        }
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| RetrievalError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            RetrievalError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject settings that would make retrieval meaningless.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("embedding.dimension", self.embedding.dimension),
            ("embedding.batch_size", self.embedding.batch_size),
            ("query.per_query_k", self.query.per_query_k),
            ("query.max_candidates", self.query.max_candidates),
            ("query.top_n", self.query.top_n),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(RetrievalError::Config(format!("{name} must be positive")));
        }
        Ok(())
    }

    pub fn with_data_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_root = dir.into();
        self
    }

    /// Set the embedding configuration.
    pub fn with_embedding(mut self, config: EmbeddingConfig) -> Self {
        self.embedding = config;
        self
    }

    pub fn with_rerank(mut self, config: RerankConfig) -> Self {
        self.rerank = config;
        self
    }

    pub fn with_expansion(mut self, config: ExpansionConfig) -> Self {
        self.expansion = config;
        self
    }

    /// Set the query configuration.
    pub fn with_query(mut self, config: QueryConfig) -> Self {
        self.query = config;
        self
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self::new(
            dirs::data_dir()
                .unwrap_or_default()
                .join("lexrag/vectorstore"),
        )
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider to use.
    pub provider: EmbeddingProviderType,

    /// Base URL of an OpenAI-compatible API.
    pub base_url: String,

    /// Model to use for embeddings.
    pub model: String,

    /// Environment variable holding the API key, if any.
    pub api_key_env: Option<String>,

    /// Vector dimension every category index is built with.
    pub dimension: usize,

    pub document_prefix: String,
    pub query_prefix: String,

    /// Maximum texts per embedding request.
    pub batch_size: usize,

    /// Whether to cache query embeddings.
    pub cache_enabled: bool,

    /// Maximum cache size.
    pub cache_max_entries: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::OpenAI,
            base_url: "http://localhost:8080/v1".to_string(),
            model: "intfloat/multilingual-e5-large".to_string(),
            api_key_env: None,
            dimension: lexrag_embeddings::DEFAULT_DIMENSION,
            document_prefix: "passage: ".to_string(),
            query_prefix: "query: ".to_string(),
            batch_size: 32,
            cache_enabled: true,
            cache_max_entries: 1024,
        }
    }
}

/// Type of embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderType {
    /// OpenAI-compatible embeddings API.
    #[serde(rename = "openai")]
    OpenAI,
    /// Deterministic token hashing, no model server.
    Hash,
}

/// Configuration for the reranker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub provider: RerankProviderType,

    /// Base URL of the cross-encoder server.
    pub base_url: String,

    pub model: Option<String>,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            provider: RerankProviderType::Http,
            base_url: "http://localhost:8081".to_string(),
            model: None,
        }
    }
}

/// Type of reranker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankProviderType {
    /// Cross-encoder behind a `/rerank` endpoint.
    Http,
    /// Keep fusion order.
    Passthrough,
}

/// Configuration for query expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    pub provider: ExpansionProviderType,

    /// Base URL of an OpenAI-compatible chat API.
    pub base_url: String,

    pub model: String,

    /// Environment variable holding the API key, if any.
    pub api_key_env: Option<String>,

    /// Maximum paraphrases requested per question.
    pub max_variants: usize,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            provider: ExpansionProviderType::None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            max_variants: 3,
        }
    }
}

/// Type of query expander.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionProviderType {
    /// OpenAI-compatible chat completions.
    Chat,
    /// No variants, no keywords.
    None,
}

/// Configuration for query processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Semantic hits taken per query variant.
    pub per_query_k: usize,

    /// Cap on the fused candidate pool.
    pub max_candidates: usize,

    /// Chunks returned after reranking.
    pub top_n: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            per_query_k: 7,
            max_candidates: 40,
            top_n: 10,
        }
    }
}
