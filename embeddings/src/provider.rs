//! Embedding providers.
//!
//! An [`Embedder`] turns chunk texts and questions into vectors of a fixed
//! dimension. Documents and queries are framed differently (e5-style
//! `passage: ` / `query: ` prefixes by default), so the two entry points are
//! kept separate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{EmbeddingError, Result};
use crate::Embedding;

/// Trait for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;

    /// Embed chunk texts, one vector per input, in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Embed a single question or paraphrase.
    async fn embed_query(&self, text: &str) -> Result<Embedding>;
}

/// Prefixes applied to inputs before they reach the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFraming {
    pub document_prefix: String,
    pub query_prefix: String,
}

impl InputFraming {
    /// The framing e5-family models were trained with.
    pub fn e5() -> Self {
        Self {
            document_prefix: "passage: ".to_string(),
            query_prefix: "query: ".to_string(),
        }
    }

    /// No prefixes.
    pub fn none() -> Self {
        Self {
            document_prefix: String::new(),
            query_prefix: String::new(),
        }
    }

    pub fn document(&self, text: &str) -> String {
        format!("{}{text}", self.document_prefix)
    }

    pub fn query(&self, text: &str) -> String {
        format!("{}{text}", self.query_prefix)
    }
}

impl Default for InputFraming {
    fn default() -> Self {
        Self::e5()
    }
}

/// Provider for any OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAIEmbedder {
    /// API key, sent as a bearer token when present.
    api_key: Option<String>,

    /// API base URL.
    base_url: String,

    /// HTTP client.
    client: reqwest::Client,

    model: String,
    dimension: usize,
    framing: InputFraming,

    /// Maximum inputs per request.
    batch_size: usize,
}

impl OpenAIEmbedder {
    pub fn new(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
            model: model.into(),
            dimension,
            framing: InputFraming::default(),
            batch_size: 32,
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_framing(mut self, framing: InputFraming) -> Self {
        self.framing = framing;
        self
    }

    /// Set the request batch size. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Embedding>> {
        debug!(
            "Requesting {} embeddings with model: {}",
            inputs.len(),
            self.model
        );

        let body = serde_json::json!({
            "input": inputs,
            "model": self.model,
        });

        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }
        let response = request.send().await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);

            return Err(EmbeddingError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiRequest(format!(
                "{status}: {error_text}"
            )));
        }

        let mut result: OpenAIEmbeddingResponse = response.json().await?;
        if result.data.len() != inputs.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                result.data.len()
            )));
        }

        result.data.sort_by_key(|item| item.index);
        let mut embeddings = Vec::with_capacity(result.data.len());
        for item in result.data {
            if item.embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: item.embedding.len(),
                });
            }
            embeddings.push(item.embedding);
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let framed: Vec<String> = texts.iter().map(|t| self.framing.document(t)).collect();
        let mut embeddings = Vec::with_capacity(framed.len());
        for batch in framed.chunks(self.batch_size) {
            embeddings.extend(self.request(batch).await?);
        }

        info!("Generated {} document embeddings", embeddings.len());
        Ok(embeddings)
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        let framed = [self.framing.query(text)];
        self.request(&framed)
            .await?
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding in response".to_string()))
    }
}

/// OpenAI API response format.
#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Deterministic offline embedder.
///
/// Hashes lowercase alphanumeric tokens into buckets and normalizes the
/// result, so texts sharing words land near each other. Useful for tests
/// and for exercising the pipeline without a model server.
///
/// Buckets come from SHA-256, so vectors persisted by one build stay
/// comparable with queries embedded by any later one.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Create a hash embedder. Zero is treated as one.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, token: &str) -> usize {
        let digest = Sha256::digest(token.to_lowercase().as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(prefix) % self.dimension as u64) as usize
    }

    fn embed(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            vector[self.bucket(token)] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        Ok(self.embed(text))
    }
}
