//! Vera Index - Vector index store and retriever
//!
//! Builds a dense matrix of unit-normalized document embeddings plus
//! parallel per-document metadata, persists both to disk, and answers
//! queries by cosine similarity against the loaded matrix.

use ndarray::Array2;
use vera_core::Document;

pub mod embedding;
pub mod retriever;
pub mod store;

pub use embedding::{create_embedding_client, EmbeddingClient, OllamaEmbedding, OpenAiCompatEmbedding};
pub use retriever::Retriever;
pub use store::IndexStore;

/// The loaded index: an embedding matrix position-aligned with document
/// metadata. Row `i` of the matrix is the unit-normalized embedding of
/// `documents[i]`. Read-only after load; rebuilt wholesale, never mutated.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    pub matrix: Array2<f32>,
    pub documents: Vec<Document>,
}

impl VectorIndex {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
