//! # Embeddings
//!
//! Model-facing capabilities for the retrieval engine: turning text into
//! vectors and scoring candidate passages against a question.
//!
//! ## Features
//!
//! - **Embedding**: [`Embedder`] with separate document and query framing
//! - **Providers**: OpenAI-compatible HTTP endpoints and an offline hash model
//! - **Caching**: memoized query embeddings via [`CachedEmbedder`]
//! - **Reranking**: [`Reranker`] scorers and the [`rerank`] ordering step
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Embedder ──► Embedding           Reranker ──► rerank           │
//! │     │                                │                          │
//! │     ▼                                ▼                          │
//! │  OpenAI/Hash ◄── CachedEmbedder   Http/Passthrough              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod provider;
pub mod rerank;

pub use cache::{CacheStats, CachedEmbedder};
pub use error::{EmbeddingError, Result};
pub use provider::{Embedder, HashEmbedder, InputFraming, OpenAIEmbedder};
pub use rerank::{rerank, HttpReranker, PassthroughReranker, Reranker};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Dimension of the multilingual-e5-large family.
pub const DEFAULT_DIMENSION: usize = 1024;
