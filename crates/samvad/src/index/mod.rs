//! Persisted per-upload vector indexes.
//!
//! Each upload batch becomes one immutable index: a set of (vector, chunk,
//! metadata) triples serialized as a blob directory keyed by index id.
//! Re-ingesting the same source always creates a new index; an existing id
//! is never silently overwritten.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::embeddings::EmbeddingClient;
use crate::error::{Error, Result};
use crate::processing::DocumentChunk;

const INDEX_FILE: &str = "index.json";

/// One (vector, chunk, metadata) triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub vector: Vec<f32>,
    pub text: String,
    pub ordinal: usize,
    pub total: usize,
}

/// An immutable similarity-searchable index built from one upload batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    pub index_id: String,
    pub dimension: usize,
    pub entries: Vec<IndexEntry>,
}

/// A retrieval hit: chunk text plus sequence metadata and similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub index_id: String,
    pub text: String,
    pub ordinal: usize,
    pub total: usize,
    pub score: f32,
}

impl VectorIndex {
    /// Nearest-neighbor search by cosine similarity, descending. Ties break
    /// on the lower chunk ordinal so results are deterministic.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<RetrievedChunk> {
        let mut hits: Vec<RetrievedChunk> = self
            .entries
            .iter()
            .map(|entry| RetrievedChunk {
                index_id: self.index_id.clone(),
                text: entry.text.clone(),
                ordinal: entry.ordinal,
                total: entry.total,
                score: cosine_similarity(&entry.vector, query),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.ordinal.cmp(&b.ordinal))
        });
        hits.truncate(k);
        hits
    }
}

/// Directory-backed store of vector indexes.
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn index_dir(&self, index_id: &str) -> PathBuf {
        self.root.join(index_id)
    }

    /// Embed every chunk in one batched call, pair vectors with chunks
    /// explicitly, and persist the result under `index_id`.
    pub async fn build(
        &self,
        chunks: &[DocumentChunk],
        index_id: &str,
        embedder: &dyn EmbeddingClient,
    ) -> Result<VectorIndex> {
        let dir = self.index_dir(index_id);
        if dir.exists() {
            return Err(Error::IndexExists(index_id.to_string()));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.embedding_text()).collect();
        let vectors = embedder.embed(&texts).await?;

        let dimension = vectors.first().map(|v| v.len()).unwrap_or(0);
        let entries: Vec<IndexEntry> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry {
                vector,
                text: chunk.text.clone(),
                ordinal: chunk.ordinal,
                total: chunk.total,
            })
            .collect();

        let index = VectorIndex {
            index_id: index_id.to_string(),
            dimension,
            entries,
        };

        std::fs::create_dir_all(&dir)?;
        let blob = serde_json::to_vec(&index)?;
        std::fs::write(dir.join(INDEX_FILE), blob)?;

        tracing::info!(
            index_id,
            chunks = index.entries.len(),
            dimension,
            "vector index persisted"
        );
        Ok(index)
    }

    /// Deserialize a previously persisted index.
    pub fn load(&self, index_id: &str) -> Result<VectorIndex> {
        let path = self.index_dir(index_id).join(INDEX_FILE);
        if !path.exists() {
            return Err(Error::IndexNotFound(index_id.to_string()));
        }
        let blob = std::fs::read(&path)?;
        Ok(serde_json::from_slice(&blob)?)
    }

    /// Embed the query and search one index.
    pub async fn search(
        index: &VectorIndex,
        query: &str,
        k: usize,
        embedder: &dyn EmbeddingClient,
    ) -> Result<Vec<RetrievedChunk>> {
        let vectors = embedder.embed(&[query.to_string()]).await?;
        let query_vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::EmbeddingService("empty embedding batch".to_string()))?;
        Ok(index.search(&query_vector, k))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Returns the same unit vector for every text, so all similarity
    /// scores are identical and ordering falls to the ordinal tie-break.
    struct ConstantEmbedder;

    #[async_trait]
    impl EmbeddingClient for ConstantEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
        }
    }

    fn chunks(texts: &[&str]) -> Vec<DocumentChunk> {
        let total = texts.len();
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| DocumentChunk {
                ordinal: i + 1,
                total,
                text: t.to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn equal_scores_return_ordinal_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        let index = store
            .build(&chunks(&["A", "B", "C"]), "idx-1", &ConstantEmbedder)
            .await
            .unwrap();

        let hits = IndexStore::search(&index, "query", 3, &ConstantEmbedder)
            .await
            .unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn save_load_round_trip_preserves_association() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        let built = store
            .build(&chunks(&["first", "second"]), "idx-rt", &ConstantEmbedder)
            .await
            .unwrap();

        let loaded = store.load("idx-rt").unwrap();
        assert_eq!(loaded.index_id, built.index_id);
        assert_eq!(loaded.entries.len(), 2);
        assert_eq!(loaded.entries[0].text, "first");
        assert_eq!(loaded.entries[0].ordinal, 1);
        assert_eq!(loaded.entries[1].total, 2);
        assert_eq!(loaded.dimension, 3);
    }

    #[tokio::test]
    async fn existing_id_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        store
            .build(&chunks(&["A"]), "idx-dup", &ConstantEmbedder)
            .await
            .unwrap();

        let err = store
            .build(&chunks(&["B"]), "idx-dup", &ConstantEmbedder)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IndexExists(id) if id == "idx-dup"));
    }

    #[test]
    fn unknown_id_fails_with_index_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        let err = store.load("nope").unwrap_err();
        assert!(matches!(err, Error::IndexNotFound(id) if id == "nope"));
    }

    #[test]
    fn cosine_handles_mismatched_and_zero_vectors() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
