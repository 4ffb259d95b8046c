//! Error types for the vector index.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors that can occur while building, searching or persisting an index.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Category name is empty or would escape the persistence root.
    #[error("invalid category name {0:?}")]
    InvalidCategory(String),

    /// Rejected before any index mutation (empty corpus, length mismatch).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Vector length differs from the index dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A persisted artifact exists but could not be read or written.
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The index file is present but cannot be parsed.
    #[error("corrupt index at {}: {reason}", path.display())]
    CorruptIndex { path: PathBuf, reason: String },
}

impl IndexError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
