//! # Retrieval Engine
//!
//! This crate answers "which passages of this category matter for this
//! question", combining:
//!
//! - **Category store**: lazy build-or-load of per-category indexes
//! - **Hybrid retrieval**: multi-query semantic search fused with keyword hits
//! - **Query expansion**: paraphrases and keywords from a chat model
//! - **Reranking**: final ordering by a cross-encoder
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Retrieval Pipeline                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  question ──► QueryExpander ──► {variants, keywords}            │
//! │                                        │                        │
//! │                                        ▼                        │
//! │  ┌──────────────┐  query   ┌──────────────────┐                 │
//! │  │ CategoryStore│◄─────────│ HybridRetriever  │◄── Embedder     │
//! │  │  (lazy load/ │  texts   │  semantic ++     │                 │
//! │  │   build)     │─────────►│  keyword, dedupe │                 │
//! │  └──────────────┘          └──────────────────┘                 │
//! │         │                          │                            │
//! │         ▼                          ▼                            │
//! │  CorpusBuilder               Reranker ──► top-N chunks          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lexrag_retrieval::{RetrievalConfig, RetrievalPipeline};
//!
//! let config = RetrievalConfig::from_toml_file("lexrag.toml")?;
//! let pipeline = RetrievalPipeline::from_config(&config)?;
//!
//! let retrieval = pipeline.retrieve("land_law", "Who may lease land?").await?;
//! for chunk in &retrieval.chunks {
//!     println!("{chunk}");
//! }
//! ```

pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod expander;
pub mod hybrid;
pub mod store;

pub use config::RetrievalConfig;
pub use corpus::{CorpusBuilder, DirectoryCorpus, EmbeddedChunk};
pub use engine::{Retrieval, RetrievalPipeline, RetrievalPipelineBuilder};
pub use error::{Result, RetrievalError};
pub use expander::{ChatExpander, Expansion, NoExpansion, QueryExpander};
pub use hybrid::{fuse, CandidateSet, HybridRetriever};
pub use store::CategoryStore;

// Re-export from dependencies for convenience
pub use lexrag_embeddings::{Embedder, Reranker};
pub use lexrag_index::{Category, IndexError, VectorIndex};
