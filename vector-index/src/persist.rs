//! On-disk persistence for category indexes.
//!
//! Each category owns one directory under the persistence root:
//!
//! ```text
//! <root>/<category>/index.json   header + vectors
//! <root>/<category>/texts.txt    one chunk text per line, position order
//! ```
//!
//! Both files are written to a `.tmp` sibling and renamed into place, index
//! first. The index header records the SHA-256 of `texts.txt`, so a reader
//! that races a writer (or finds a truncated file) sees a pair that does not
//! match and treats the category as not built.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::category::Category;
use crate::error::{IndexError, Result};
use crate::index::{Vector, VectorIndex};

pub const INDEX_FILE: &str = "index.json";
pub const TEXTS_FILE: &str = "texts.txt";

const FORMAT: &str = "lexrag-flat-l2";
const FORMAT_VERSION: u32 = 1;

/// Where category artifacts live.
#[derive(Debug, Clone)]
pub struct IndexLayout {
    root: PathBuf,
}

impl IndexLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn category_dir(&self, category: &Category) -> PathBuf {
        self.root.join(category.as_str())
    }

    pub fn index_path(&self, category: &Category) -> PathBuf {
        self.category_dir(category).join(INDEX_FILE)
    }

    pub fn texts_path(&self, category: &Category) -> PathBuf {
        self.category_dir(category).join(TEXTS_FILE)
    }
}

#[derive(Serialize)]
struct IndexHeaderRef<'a> {
    format: &'a str,
    version: u32,
    dim: usize,
    count: usize,
    texts_sha256: &'a str,
    vectors: &'a [Vector],
}

#[derive(Deserialize)]
struct IndexFile {
    format: String,
    version: u32,
    dim: usize,
    count: usize,
    texts_sha256: String,
    vectors: Vec<Vector>,
}

/// Write `index` for `category`, replacing any previous artifacts.
pub async fn save(layout: &IndexLayout, category: &Category, index: &VectorIndex) -> Result<()> {
    let dir = layout.category_dir(category);
    fs::create_dir_all(&dir)
        .await
        .map_err(|e| IndexError::io(&dir, e))?;

    let texts_body = render_texts(index.texts());
    let digest = sha256_hex(texts_body.as_bytes());

    let header = IndexHeaderRef {
        format: FORMAT,
        version: FORMAT_VERSION,
        dim: index.dim(),
        count: index.len(),
        texts_sha256: &digest,
        vectors: index.vectors(),
    };
    let index_path = layout.index_path(category);
    let index_body =
        serde_json::to_vec(&header).map_err(|e| IndexError::io(&index_path, e.into()))?;

    let texts_path = layout.texts_path(category);
    let index_tmp = tmp_path(&index_path);
    let texts_tmp = tmp_path(&texts_path);

    write(&index_tmp, index_body).await?;
    write(&texts_tmp, texts_body.into_bytes()).await?;
    rename(&index_tmp, &index_path).await?;
    rename(&texts_tmp, &texts_path).await?;

    info!(
        "Persisted index for '{category}' ({} chunks) to {}",
        index.len(),
        dir.display()
    );
    Ok(())
}

/// Read the persisted index for `category`.
///
/// Returns `Ok(None)` when the category has not been built: either file is
/// missing, or the pair is torn (text count or digest disagrees with the
/// header). A present index file that cannot be parsed is
/// [`IndexError::CorruptIndex`].
pub async fn load(layout: &IndexLayout, category: &Category) -> Result<Option<VectorIndex>> {
    let index_path = layout.index_path(category);
    let texts_path = layout.texts_path(category);

    let Some(index_bytes) = read_if_present(&index_path).await? else {
        debug!("No persisted index for '{category}'");
        return Ok(None);
    };
    let Some(texts_bytes) = read_if_present(&texts_path).await? else {
        debug!("Index for '{category}' has no texts file");
        return Ok(None);
    };

    let file: IndexFile = serde_json::from_slice(&index_bytes).map_err(|e| corrupt(&index_path, e))?;
    if file.format != FORMAT || file.version != FORMAT_VERSION {
        return Err(corrupt(
            &index_path,
            format!("unsupported format {} v{}", file.format, file.version),
        ));
    }
    if file.vectors.len() != file.count {
        return Err(corrupt(
            &index_path,
            format!("header says {} vectors, found {}", file.count, file.vectors.len()),
        ));
    }
    if let Some(bad) = file.vectors.iter().find(|v| v.len() != file.dim) {
        return Err(corrupt(
            &index_path,
            format!("vector of length {} in index of dimension {}", bad.len(), file.dim),
        ));
    }

    if sha256_hex(&texts_bytes) != file.texts_sha256 {
        warn!("Texts for '{category}' do not match the index; treating as not built");
        return Ok(None);
    }
    let texts_body = String::from_utf8(texts_bytes).map_err(|e| corrupt(&texts_path, e))?;
    let texts: Vec<String> = texts_body.lines().map(str::to_string).collect();
    if texts.len() != file.count {
        warn!(
            "Texts for '{category}' hold {} lines for {} vectors; treating as not built",
            texts.len(),
            file.count
        );
        return Ok(None);
    }

    let index = VectorIndex::build(file.vectors, texts, file.dim)
        .map_err(|e| corrupt(&index_path, e))?;
    info!("Loaded index for '{category}' ({} chunks)", index.len());
    Ok(Some(index))
}

/// Remove every artifact for `category`. Returns whether anything existed.
pub async fn remove(layout: &IndexLayout, category: &Category) -> Result<bool> {
    let dir = layout.category_dir(category);
    match fs::remove_dir_all(&dir).await {
        Ok(()) => {
            info!("Removed persisted index for '{category}'");
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(IndexError::io(dir, e)),
    }
}

fn render_texts(texts: &[String]) -> String {
    let mut body = String::with_capacity(texts.iter().map(|t| t.len() + 1).sum());
    for text in texts {
        body.push_str(text);
        body.push('\n');
    }
    body
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn corrupt(path: &Path, reason: impl ToString) -> IndexError {
    IndexError::CorruptIndex {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

async fn read_if_present(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(IndexError::io(path, e)),
    }
}

async fn write(path: &Path, bytes: Vec<u8>) -> Result<()> {
    fs::write(path, bytes)
        .await
        .map_err(|e| IndexError::io(path, e))
}

async fn rename(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to)
        .await
        .map_err(|e| IndexError::io(to, e))
}
