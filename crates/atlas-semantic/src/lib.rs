//! Semantic layer for atlas: persisted vector index and entity embeddings.
//!
//! - [`vector`] — fixed-dimension cosine index persisted in `vectors.db`
//! - [`embedder`] — the [`EmbeddingProvider`](embedder::EmbeddingProvider)
//!   seam and the deterministic default implementation
//! - [`indexer`] — keeps the vector store coherent with graph commits

pub mod embedder;
pub mod indexer;
pub mod vector;
