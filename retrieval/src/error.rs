//! Error types for the retrieval engine.

use lexrag_index::IndexError;
use thiserror::Error;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur in the retrieval engine.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Index, persistence or category validation error.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Embedding or reranking error.
    #[error("embedding error: {0}")]
    Embedding(#[from] lexrag_embeddings::EmbeddingError),

    /// Query against a category that is neither resident nor persisted, with
    /// nothing available to build it.
    #[error("category '{0}' has no index and no corpus builder")]
    CategoryNotReady(String),

    /// The corpus builder failed.
    #[error("failed to build category '{category}': {source:#}")]
    Build {
        category: String,
        #[source]
        source: anyhow::Error,
    },

    /// Question is empty or whitespace.
    #[error("question is empty")]
    EmptyQuestion,

    /// Query expansion error.
    #[error("expansion error: {0}")]
    Expansion(String),

    /// A persisted index was built with a different embedding dimension than
    /// the store is configured for.
    #[error("index for '{category}' has dimension {actual}, store expects {expected}")]
    StoredDimensionMismatch {
        category: String,
        expected: usize,
        actual: usize,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RetrievalError {
    /// Whether the caller, not the system, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Index(
                IndexError::InvalidCategory(_)
                    | IndexError::InvalidInput(_)
                    | IndexError::DimensionMismatch { .. }
            ) | Self::CategoryNotReady(_)
                | Self::EmptyQuestion
        )
    }
}
