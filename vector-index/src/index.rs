//! Exact nearest-neighbor index for one category.

use tracing::debug;

use crate::distance::nearest;
use crate::error::{IndexError, Result};

/// A dense vector.
pub type Vector = Vec<f32>;

/// One search result.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    /// Position of the chunk in the category's ordered chunk list.
    pub position: usize,

    /// The chunk text.
    pub text: String,

    /// Squared Euclidean distance to the query.
    pub distance: f32,
}

/// Parallel vectors and chunk texts for one category.
///
/// Position `i` in `vectors` belongs to the text at position `i` in `texts`.
/// The index is immutable once built: changes go through a full rebuild.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dim: usize,
    vectors: Vec<Vector>,
    texts: Vec<String>,
}

impl VectorIndex {
    /// Create an empty index.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            vectors: Vec::new(),
            texts: Vec::new(),
        }
    }

    /// Build an index in memory from parallel vectors and texts.
    ///
    /// Requires at least one entry, equal lengths, and every vector of
    /// length `dim`. Newlines inside texts are collapsed to spaces so the
    /// index matches what [`crate::persist::load`] reads back.
    pub fn build(vectors: Vec<Vector>, texts: Vec<String>, dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(IndexError::InvalidInput(
                "dimension must be positive".to_string(),
            ));
        }
        if vectors.is_empty() {
            return Err(IndexError::InvalidInput("no chunks to index".to_string()));
        }
        if vectors.len() != texts.len() {
            return Err(IndexError::InvalidInput(format!(
                "{} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(IndexError::DimensionMismatch {
                expected: dim,
                actual: bad.len(),
            });
        }
        if vectors.iter().flatten().any(|x| !x.is_finite()) {
            return Err(IndexError::InvalidInput(
                "vectors contain non-finite components".to_string(),
            ));
        }

        let texts = texts.into_iter().map(|t| collapse_newlines(&t)).collect();
        debug!("Built index with {} vectors of dimension {dim}", vectors.len());

        Ok(Self {
            dim,
            vectors,
            texts,
        })
    }

    /// Search for the `top_k` chunks closest to `query`.
    ///
    /// Results are ordered by ascending distance, ties by position. An empty
    /// index yields no results.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                actual: query.len(),
            });
        }

        let hits = nearest(query, &self.vectors, top_k)
            .into_iter()
            .filter_map(|(position, distance)| {
                self.texts.get(position).map(|text| Neighbor {
                    position,
                    text: text.clone(),
                    distance,
                })
            })
            .collect();

        Ok(hits)
    }

    /// The fixed vector dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Chunk texts in position order.
    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    /// Stored vectors in position order.
    pub fn vectors(&self) -> &[Vector] {
        &self.vectors
    }

    /// Consume the index, returning its vectors and texts.
    pub fn into_parts(self) -> (Vec<Vector>, Vec<String>) {
        (self.vectors, self.texts)
    }
}

pub(crate) fn collapse_newlines(text: &str) -> String {
    if text.contains(['\n', '\r']) {
        text.replace("\r\n", " ").replace(['\n', '\r'], " ")
    } else {
        text.to_string()
    }
}
