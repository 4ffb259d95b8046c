//! Corpus builders: where a category's chunks and vectors come from.
//!
//! [`CategoryStore`](crate::CategoryStore) calls a [`CorpusBuilder`] when a
//! category has neither a resident nor a persisted index. Builders report
//! failures as `anyhow` errors; the store wraps them with the category name.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use lexrag_embeddings::Embedder;
use lexrag_index::{Category, Vector};
use tracing::{debug, info};
use walkdir::WalkDir;

/// One chunk text and its document embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub vector: Vector,
    pub text: String,
}

/// Produces the ordered, embedded chunks of a category.
#[async_trait]
pub trait CorpusBuilder: Send + Sync {
    async fn build(&self, category: &Category) -> anyhow::Result<Vec<EmbeddedChunk>>;
}

/// Embed `texts` as documents, pairing each with its vector.
pub async fn embed_chunks(
    embedder: &dyn Embedder,
    texts: Vec<String>,
) -> anyhow::Result<Vec<EmbeddedChunk>> {
    let vectors = embedder
        .embed_documents(&texts)
        .await
        .context("failed to embed chunks")?;
    if vectors.len() != texts.len() {
        bail!(
            "embedder returned {} vectors for {} chunks",
            vectors.len(),
            texts.len()
        );
    }

    Ok(vectors
        .into_iter()
        .zip(texts)
        .map(|(vector, text)| EmbeddedChunk { vector, text })
        .collect())
}

/// Split text into paragraph chunks on blank lines.
///
/// Lines inside a paragraph are trimmed and joined with single spaces.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            if !current.is_empty() {
                chunks.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        chunks.push(current.join(" "));
    }

    chunks
}

/// Read `paths` in order and split each into paragraph chunks.
pub async fn read_chunks(paths: &[PathBuf]) -> anyhow::Result<Vec<String>> {
    let mut chunks = Vec::new();
    for path in paths {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let before = chunks.len();
        chunks.extend(split_paragraphs(&text));
        debug!("Read {} chunks from {}", chunks.len() - before, path.display());
    }
    Ok(chunks)
}

/// Builds a category from `<data_root>/<category>/**/*.txt`.
///
/// Files are read in sorted path order so chunk positions are reproducible
/// across rebuilds.
pub struct DirectoryCorpus {
    data_root: PathBuf,
    embedder: Arc<dyn Embedder>,
}

impl DirectoryCorpus {
    pub fn new(data_root: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            data_root: data_root.into(),
            embedder,
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn source_dir(&self, category: &Category) -> PathBuf {
        self.data_root.join(category.as_str())
    }

    /// Text files of `category`, in sorted path order.
    pub fn source_files(&self, category: &Category) -> anyhow::Result<Vec<PathBuf>> {
        let dir = self.source_dir(category);
        if !dir.is_dir() {
            bail!("source directory not found: {}", dir.display());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
            let path = entry.path();
            if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "txt") {
                files.push(path.to_path_buf());
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl CorpusBuilder for DirectoryCorpus {
    async fn build(&self, category: &Category) -> anyhow::Result<Vec<EmbeddedChunk>> {
        let files = self.source_files(category)?;
        let chunks = read_chunks(&files).await?;
        info!(
            "Embedding {} chunks from {} files for '{category}'",
            chunks.len(),
            files.len()
        );
        embed_chunks(self.embedder.as_ref(), chunks).await
    }
}
