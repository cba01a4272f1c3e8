//! Cosine-similarity retrieval over the persisted index

use ndarray::ArrayView1;
use std::sync::Arc;
use vera_core::{Result, RetrievedChunk};

use crate::embedding::EmbeddingClient;
use crate::store::{normalize, IndexStore};
use crate::VectorIndex;

/// Retrieves the most similar documents for a query. Loads the persisted
/// index on every call; the index is read-only at query time, so a rebuild
/// between queries is picked up by the next retrieve.
pub struct Retriever {
    store: IndexStore,
    embedder: Arc<dyn EmbeddingClient>,
}

impl Retriever {
    pub fn new(store: IndexStore, embedder: Arc<dyn EmbeddingClient>) -> Self {
        Self { store, embedder }
    }

    /// Return the `top_k` documents most similar to `query`, sorted by
    /// descending cosine similarity with ties broken by lower document id.
    /// Asking for more documents than the index holds returns them all.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        let index = self.store.load()?;

        let mut query_vec = self.embedder.embed_text(query).await?;
        normalize(&mut query_vec);

        if query_vec.len() != index.matrix.ncols() {
            return Err(vera_core::VeraError::IndexCorrupt(format!(
                "query embedding has {} dimensions but the index has {}; rebuild the index \
                 with the current embedding model",
                query_vec.len(),
                index.matrix.ncols()
            )));
        }

        let chunks = rank(&index, &query_vec, top_k);
        tracing::debug!(
            top_k,
            returned = chunks.len(),
            "retrieved documents for query"
        );
        Ok(chunks)
    }
}

/// Score every row of the index against a unit-normalized query vector and
/// take the top `k`. Stable sort keeps the id order on equal scores.
pub fn rank(index: &VectorIndex, query_vec: &[f32], k: usize) -> Vec<RetrievedChunk> {
    let sims = index.matrix.dot(&ArrayView1::from(query_vec));

    let mut order: Vec<usize> = (0..sims.len()).collect();
    order.sort_by(|&a, &b| sims[b].total_cmp(&sims[a]));

    order
        .into_iter()
        .take(k)
        .map(|i| RetrievedChunk::from_document(&index.documents[i], sims[i]))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
