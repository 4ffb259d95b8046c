//! A persisted index reloads to the same searchable corpus.

use std::collections::BTreeSet;

use lexrag_index::persist::{load, save};
use lexrag_index::{Category, IndexLayout, VectorIndex};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn corpus(n: usize, dim: usize) -> (Vec<Vec<f32>>, Vec<String>) {
    let vectors = (0..n)
        .map(|i| {
            (0..dim)
                .map(|d| ((i * 31 + d * 7) % 17) as f32 / 4.0 - 2.0)
                .collect()
        })
        .collect();
    let texts = (0..n).map(|i| format!("Article {}: clause text", i + 1)).collect();
    (vectors, texts)
}

#[tokio::test]
async fn search_after_reload_enumerates_every_chunk() {
    let temp_dir = TempDir::new().unwrap();
    let layout = IndexLayout::new(temp_dir.path());

    for (n, dim) in [(1, 1), (3, 2), (25, 8), (64, 16)] {
        let category = Category::new(format!("corpus_{n}_{dim}")).unwrap();
        let (vectors, texts) = corpus(n, dim);
        let expected: BTreeSet<String> = texts.iter().cloned().collect();

        let built = VectorIndex::build(vectors, texts, dim).unwrap();
        save(&layout, &category, &built).await.unwrap();
        let loaded = load(&layout, &category).await.unwrap().unwrap();

        let query = vec![0.25; dim];
        let hits = loaded.search(&query, n).unwrap();
        let found: BTreeSet<String> = hits.iter().map(|h| h.text.clone()).collect();

        assert_eq!(hits.len(), n);
        assert_eq!(found, expected);
        assert_eq!(hits, built.search(&query, n).unwrap());
    }
}
