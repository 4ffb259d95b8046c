//! Category registry with lazy build-or-load.
//!
//! The store maps each category to its resident [`VectorIndex`]. A category
//! becomes resident the first time it is loaded from disk or built. Builds
//! are serialized per category: concurrent first queries for the same
//! category run the corpus builder once, while other categories proceed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lexrag_index::{persist, Category, IndexLayout, VectorIndex};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::corpus::{CorpusBuilder, EmbeddedChunk};
use crate::error::{Result, RetrievalError};

/// Process-wide registry of category indexes.
pub struct CategoryStore {
    layout: IndexLayout,
    dimension: usize,
    builder: Option<Arc<dyn CorpusBuilder>>,
    resident: RwLock<HashMap<Category, Arc<VectorIndex>>>,

    /// Held only to look up, insert or release a category's lock, never
    /// across a build. Entries live only while some task holds their lock.
    build_locks: Mutex<HashMap<Category, Arc<Mutex<()>>>>,
}

impl CategoryStore {
    /// Create a store persisting under `persist_root`. Every category index
    /// must have vectors of length `dimension`.
    pub fn new(persist_root: impl Into<PathBuf>, dimension: usize) -> Self {
        Self {
            layout: IndexLayout::new(persist_root),
            dimension,
            builder: None,
            resident: RwLock::new(HashMap::new()),
            build_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Set the corpus builder used when a category has no index yet.
    pub fn with_builder(mut self, builder: Arc<dyn CorpusBuilder>) -> Self {
        self.builder = Some(builder);
        self
    }

    pub fn persist_root(&self) -> &Path {
        self.layout.root()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Return the resident index for `category`, loading or building it if
    /// needed. Fails with [`RetrievalError::CategoryNotReady`] when nothing is
    /// persisted and no corpus builder is configured.
    pub async fn ensure_loaded(&self, category: &str) -> Result<Arc<VectorIndex>> {
        let category = Category::new(category)?;
        self.ensure(&category, self.builder.as_deref()).await
    }

    /// Like [`Self::ensure_loaded`], building with `builder` if needed.
    pub async fn ensure_loaded_with(
        &self,
        category: &str,
        builder: &dyn CorpusBuilder,
    ) -> Result<Arc<VectorIndex>> {
        let category = Category::new(category)?;
        self.ensure(&category, Some(builder)).await
    }

    /// Return the resident or persisted index without building.
    pub async fn load(&self, category: &str) -> Result<Option<Arc<VectorIndex>>> {
        let category = Category::new(category)?;
        match self.ensure(&category, None).await {
            Ok(index) => Ok(Some(index)),
            Err(RetrievalError::CategoryNotReady(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Texts of the `top_k` chunks nearest to `vector`, nearest first.
    pub async fn query(&self, vector: &[f32], category: &str, top_k: usize) -> Result<Vec<String>> {
        let index = self.ensure_loaded(category).await?;
        let hits = index.search(vector, top_k)?;
        Ok(hits.into_iter().map(|hit| hit.text).collect())
    }

    /// Build `category` from `chunks`, replacing any existing index.
    pub async fn build(&self, category: &str, chunks: Vec<EmbeddedChunk>) -> Result<Arc<VectorIndex>> {
        let category = Category::new(category)?;
        let lock = self.build_lock(&category).await;
        let result = {
            let _guard = lock.lock().await;
            self.build_locked(&category, chunks).await
        };
        self.release_build_lock(&category, lock).await;
        result
    }

    /// Rebuild `category` from the configured corpus builder.
    pub async fn rebuild(&self, category: &str) -> Result<Arc<VectorIndex>> {
        let category = Category::new(category)?;
        let builder = self
            .builder
            .as_deref()
            .ok_or_else(|| RetrievalError::CategoryNotReady(category.to_string()))?;

        let lock = self.build_lock(&category).await;
        let result = {
            let _guard = lock.lock().await;
            match run_builder(builder, &category).await {
                Ok(chunks) => self.build_locked(&category, chunks).await,
                Err(e) => Err(e),
            }
        };
        self.release_build_lock(&category, lock).await;
        result
    }

    /// Append `new_chunks` to `category` and rebuild over the union.
    ///
    /// Existing chunks keep their stored vectors. A category with no index
    /// is built from `new_chunks` alone.
    pub async fn update(
        &self,
        category: &str,
        new_chunks: Vec<EmbeddedChunk>,
    ) -> Result<Arc<VectorIndex>> {
        let category = Category::new(category)?;
        let lock = self.build_lock(&category).await;
        let result = {
            let _guard = lock.lock().await;
            self.update_locked(&category, new_chunks).await
        };
        self.release_build_lock(&category, lock).await;
        result
    }

    async fn update_locked(
        &self,
        category: &Category,
        new_chunks: Vec<EmbeddedChunk>,
    ) -> Result<Arc<VectorIndex>> {
        let existing = match self.resident_index(category).await {
            Some(index) => Some(index),
            None => self.load_persisted(category).await?,
        };
        let Some(existing) = existing else {
            debug!("No index for '{category}'; update builds from new chunks");
            return self.build_locked(category, new_chunks).await;
        };

        let (vectors, texts) = VectorIndex::clone(&existing).into_parts();
        let mut chunks: Vec<EmbeddedChunk> = vectors
            .into_iter()
            .zip(texts)
            .map(|(vector, text)| EmbeddedChunk { vector, text })
            .collect();
        info!(
            "Updating '{category}': {} existing + {} new chunks",
            chunks.len(),
            new_chunks.len()
        );
        chunks.extend(new_chunks);
        self.build_locked(category, chunks).await
    }

    /// Forget `category` and remove its artifacts. Returns whether anything
    /// existed; deleting an unbuilt category is not an error.
    pub async fn delete(&self, category: &str) -> Result<bool> {
        let category = Category::new(category)?;
        let lock = self.build_lock(&category).await;
        let result = {
            let _guard = lock.lock().await;
            let was_resident = self.resident.write().await.remove(&category).is_some();
            persist::remove(&self.layout, &category)
                .await
                .map(|was_persisted| was_resident || was_persisted)
        };
        self.release_build_lock(&category, lock).await;

        let existed = result?;
        if existed {
            info!("Deleted category '{category}'");
        }
        Ok(existed)
    }

    /// Whether `category` has an index in memory.
    pub async fn is_resident(&self, category: &str) -> bool {
        match Category::new(category) {
            Ok(category) => self.resident.read().await.contains_key(&category),
            Err(_) => false,
        }
    }

    /// Resident categories, sorted by name.
    pub async fn resident_categories(&self) -> Vec<Category> {
        let mut categories: Vec<Category> = self.resident.read().await.keys().cloned().collect();
        categories.sort();
        categories
    }

    /// Chunk texts of a resident category, in position order.
    pub async fn texts(&self, category: &str) -> Option<Vec<String>> {
        let category = Category::new(category).ok()?;
        self.resident_index(&category)
            .await
            .map(|index| index.texts().to_vec())
    }

    async fn ensure(
        &self,
        category: &Category,
        builder: Option<&dyn CorpusBuilder>,
    ) -> Result<Arc<VectorIndex>> {
        if let Some(index) = self.resident_index(category).await {
            return Ok(index);
        }

        let lock = self.build_lock(category).await;
        let result = {
            let _guard = lock.lock().await;
            self.ensure_locked(category, builder).await
        };
        self.release_build_lock(category, lock).await;
        result
    }

    async fn ensure_locked(
        &self,
        category: &Category,
        builder: Option<&dyn CorpusBuilder>,
    ) -> Result<Arc<VectorIndex>> {
        // Another task may have finished while this one waited.
        if let Some(index) = self.resident_index(category).await {
            return Ok(index);
        }
        if let Some(index) = self.load_persisted(category).await? {
            return Ok(index);
        }

        let Some(builder) = builder else {
            return Err(RetrievalError::CategoryNotReady(category.to_string()));
        };
        info!("Building index for '{category}'");
        let chunks = run_builder(builder, category).await?;
        self.build_locked(category, chunks).await
    }

    /// Load from disk and register. Caller holds the category's build lock.
    async fn load_persisted(&self, category: &Category) -> Result<Option<Arc<VectorIndex>>> {
        let Some(index) = persist::load(&self.layout, category).await? else {
            return Ok(None);
        };
        self.check_dimension(category, index.dim())?;
        Ok(Some(self.register(category, index).await))
    }

    /// Build in memory, persist, then register. Caller holds the category's
    /// build lock.
    async fn build_locked(
        &self,
        category: &Category,
        chunks: Vec<EmbeddedChunk>,
    ) -> Result<Arc<VectorIndex>> {
        let (vectors, texts): (Vec<_>, Vec<_>) =
            chunks.into_iter().map(|c| (c.vector, c.text)).unzip();
        let index = VectorIndex::build(vectors, texts, self.dimension)?;
        persist::save(&self.layout, category, &index).await?;
        Ok(self.register(category, index).await)
    }

    async fn register(&self, category: &Category, index: VectorIndex) -> Arc<VectorIndex> {
        let index = Arc::new(index);
        self.resident
            .write()
            .await
            .insert(category.clone(), Arc::clone(&index));
        debug!("Registered '{category}' ({} chunks)", index.len());
        index
    }

    async fn resident_index(&self, category: &Category) -> Option<Arc<VectorIndex>> {
        self.resident.read().await.get(category).cloned()
    }

    async fn build_lock(&self, category: &Category) -> Arc<Mutex<()>> {
        let mut locks = self.build_locks.lock().await;
        Arc::clone(locks.entry(category.clone()).or_default())
    }

    /// Drop the registry entry for `category` unless another task still holds
    /// or waits on `lock`. Call after the guard is released.
    async fn release_build_lock(&self, category: &Category, lock: Arc<Mutex<()>>) {
        let mut locks = self.build_locks.lock().await;
        let unshared = locks
            .get(category)
            .is_some_and(|entry| Arc::ptr_eq(entry, &lock) && Arc::strong_count(&lock) == 2);
        if unshared {
            locks.remove(category);
        }
    }

    fn check_dimension(&self, category: &Category, dim: usize) -> Result<()> {
        if dim != self.dimension {
            return Err(RetrievalError::StoredDimensionMismatch {
                category: category.to_string(),
                expected: self.dimension,
                actual: dim,
            });
        }
        Ok(())
    }
}

async fn run_builder(
    builder: &dyn CorpusBuilder,
    category: &Category,
) -> Result<Vec<EmbeddedChunk>> {
    builder
        .build(category)
        .await
        .map_err(|source| RetrievalError::Build {
            category: category.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn chunk(vector: Vec<f32>, text: &str) -> EmbeddedChunk {
        EmbeddedChunk {
            vector,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_build_then_query() {
        let temp_dir = TempDir::new().unwrap();
        let store = CategoryStore::new(temp_dir.path(), 2);

        store
            .build(
                "civil_law",
                vec![chunk(vec![0.0, 0.0], "near"), chunk(vec![5.0, 5.0], "far")],
            )
            .await
            .unwrap();

        assert!(store.is_resident("civil_law").await);
        let hits = store.query(&[0.1, 0.1], "civil_law", 1).await.unwrap();
        assert_eq!(hits, vec!["near".to_string()]);
    }

    #[tokio::test]
    async fn test_query_without_builder_is_not_ready() {
        let temp_dir = TempDir::new().unwrap();
        let store = CategoryStore::new(temp_dir.path(), 2);

        let err = store.query(&[0.0, 0.0], "civil_law", 3).await.unwrap_err();
        assert!(matches!(err, RetrievalError::CategoryNotReady(_)));
        assert!(err.is_client_error());
        assert!(store.load("civil_law").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persisted_index_loads_in_new_store() {
        let temp_dir = TempDir::new().unwrap();
        CategoryStore::new(temp_dir.path(), 1)
            .build("labor_law", vec![chunk(vec![1.0], "a"), chunk(vec![2.0], "b")])
            .await
            .unwrap();

        let store = CategoryStore::new(temp_dir.path(), 1);
        assert!(!store.is_resident("labor_law").await);
        let hits = store.query(&[2.0], "labor_law", 5).await.unwrap();
        assert_eq!(hits, vec!["b".to_string(), "a".to_string()]);
        assert_eq!(
            store.resident_categories().await,
            vec![Category::new("labor_law").unwrap()]
        );
    }

    #[tokio::test]
    async fn test_persisted_dimension_mismatch_is_surfaced() {
        let temp_dir = TempDir::new().unwrap();
        CategoryStore::new(temp_dir.path(), 1)
            .build("labor_law", vec![chunk(vec![1.0], "a")])
            .await
            .unwrap();

        let store = CategoryStore::new(temp_dir.path(), 3);
        let err = store.ensure_loaded("labor_law").await.unwrap_err();
        assert!(matches!(
            &err,
            RetrievalError::StoredDimensionMismatch {
                category,
                expected: 3,
                actual: 1
            } if category == "labor_law"
        ));
        assert!(!err.is_client_error());
        assert!(!store.is_resident("labor_law").await);
    }

    #[tokio::test]
    async fn test_invalid_build_leaves_prior_state() {
        let temp_dir = TempDir::new().unwrap();
        let store = CategoryStore::new(temp_dir.path(), 2);
        store
            .build("tax_law", vec![chunk(vec![1.0, 1.0], "kept")])
            .await
            .unwrap();

        let err = store
            .build("tax_law", vec![chunk(vec![1.0], "wrong dim")])
            .await
            .unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(store.texts("tax_law").await, Some(vec!["kept".to_string()]));

        let reloaded = CategoryStore::new(temp_dir.path(), 2);
        let index = reloaded.ensure_loaded("tax_law").await.unwrap();
        assert_eq!(index.texts(), &["kept".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_removes_memory_and_disk() {
        let temp_dir = TempDir::new().unwrap();
        let store = CategoryStore::new(temp_dir.path(), 1);
        store
            .build("family_law", vec![chunk(vec![0.0], "x")])
            .await
            .unwrap();

        assert!(store.delete("family_law").await.unwrap());
        assert!(!store.is_resident("family_law").await);
        assert!(!temp_dir.path().join("family_law").exists());
        assert!(!store.delete("family_law").await.unwrap());
    }

    struct FixedBuilder;

    #[async_trait::async_trait]
    impl CorpusBuilder for FixedBuilder {
        async fn build(&self, _category: &Category) -> anyhow::Result<Vec<EmbeddedChunk>> {
            Ok(vec![chunk(vec![0.5], "built on demand")])
        }
    }

    #[tokio::test]
    async fn test_ensure_loaded_with_explicit_builder() {
        let temp_dir = TempDir::new().unwrap();
        let store = CategoryStore::new(temp_dir.path(), 1);

        let index = store
            .ensure_loaded_with("land_law", &FixedBuilder)
            .await
            .unwrap();
        assert_eq!(index.texts(), &["built on demand".to_string()]);

        let hits = store.query(&[0.0], "land_law", 3).await.unwrap();
        assert_eq!(hits, vec!["built on demand".to_string()]);
    }

    struct FailingBuilder;

    #[async_trait::async_trait]
    impl CorpusBuilder for FailingBuilder {
        async fn build(&self, _category: &Category) -> anyhow::Result<Vec<EmbeddedChunk>> {
            anyhow::bail!("corpus unavailable")
        }
    }

    async fn lock_entries(store: &CategoryStore) -> usize {
        store.build_locks.lock().await.len()
    }

    #[tokio::test]
    async fn test_build_locks_do_not_outlive_operations() {
        let temp_dir = TempDir::new().unwrap();
        let store = CategoryStore::new(temp_dir.path(), 1);

        for i in 0..100 {
            let name = format!("cat_{i}");
            assert!(store.query(&[0.0], &name, 1).await.is_err());
            assert!(store.rebuild(&name).await.is_err());
        }
        assert_eq!(lock_entries(&store).await, 0);

        assert!(
            store
                .ensure_loaded_with("tax_law", &FailingBuilder)
                .await
                .is_err()
        );
        assert!(store.build("tax_law", Vec::new()).await.is_err());
        assert_eq!(lock_entries(&store).await, 0);

        store.build("x", vec![chunk(vec![1.0], "a")]).await.unwrap();
        store.update("x", vec![chunk(vec![2.0], "b")]).await.unwrap();
        store.ensure_loaded("x").await.unwrap();
        assert!(store.delete("x").await.unwrap());
        assert!(!store.delete("x").await.unwrap());
        assert_eq!(lock_entries(&store).await, 0);
    }

    #[tokio::test]
    async fn test_rebuild_requires_builder() {
        let temp_dir = TempDir::new().unwrap();
        let store = CategoryStore::new(temp_dir.path(), 1);
        assert!(matches!(
            store.rebuild("land_law").await,
            Err(RetrievalError::CategoryNotReady(_))
        ));
    }
}
