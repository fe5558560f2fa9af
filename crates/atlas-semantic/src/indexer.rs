//! Semantic indexer: keeps the vector store coherent with graph commits.
//!
//! On every per-file commit the indexer diffs the file's old and new entity
//! sets. Removed ids lose their embeddings inside the same commit window;
//! added or changed entities are queued for background embedding. Queries
//! that run before the queue drains simply see fewer semantic candidates.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use atlas_core::error::EngineError;
use atlas_core::types::Entity;

use crate::embedder::{embedding_input, EmbeddingProvider};
use crate::vector::VectorStore;

/// Bounded embedding backlog; overflow drops the oldest pending entity.
pub const MAX_PENDING: usize = 4096;

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct SemanticStats {
    pub pending: usize,
    pub embedded: u64,
    pub deleted: u64,
    pub dropped: u64,
}

pub struct SemanticIndexer {
    store: Arc<VectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    pending: Mutex<VecDeque<Entity>>,
    stats: Mutex<SemanticStats>,
}

impl SemanticIndexer {
    pub fn new(store: Arc<VectorStore>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            store,
            provider,
            pending: Mutex::new(VecDeque::new()),
            stats: Mutex::new(SemanticStats::default()),
        }
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// React to a per-file commit: delete embeddings of removed entities now,
    /// queue added/changed entities for embedding.
    pub fn on_commit(
        &self,
        old_entities: &[Entity],
        new_entities: &[Entity],
    ) -> Result<(), EngineError> {
        let old_inputs: HashMap<&str, String> = old_entities
            .iter()
            .map(|e| (e.id.as_str(), embedding_input(e)))
            .collect();
        let new_ids: std::collections::HashSet<&str> =
            new_entities.iter().map(|e| e.id.as_str()).collect();

        for old in old_entities {
            if !new_ids.contains(old.id.as_str()) {
                self.store.delete(&old.id)?;
                self.stats.lock().expect("stats lock").deleted += 1;
            }
        }

        let mut pending = self.pending.lock().expect("pending lock");
        for entity in new_entities {
            let unchanged = old_inputs
                .get(entity.id.as_str())
                .is_some_and(|old_input| *old_input == embedding_input(entity));
            if unchanged {
                continue;
            }
            if pending.len() >= MAX_PENDING {
                pending.pop_front();
                self.stats.lock().expect("stats lock").dropped += 1;
                warn!("embedding backlog full, dropping oldest pending entity");
            }
            pending.push_back(entity.clone());
        }
        Ok(())
    }

    /// Drop every embedding owned by a deleted file.
    pub fn on_file_deleted(&self, old_entities: &[Entity]) -> Result<(), EngineError> {
        for entity in old_entities {
            self.store.delete(&entity.id)?;
            self.stats.lock().expect("stats lock").deleted += 1;
        }
        let mut pending = self.pending.lock().expect("pending lock");
        let before = pending.len();
        let doomed: std::collections::HashSet<&str> =
            old_entities.iter().map(|e| e.id.as_str()).collect();
        pending.retain(|e| !doomed.contains(e.id.as_str()));
        debug!("pruned {} pending embeddings", before - pending.len());
        Ok(())
    }

    /// Embed up to `limit` pending entities. Returns how many were written.
    /// This is the background worker's unit of work; callers bound it with
    /// the scheduler.
    pub fn embed_pending(&self, limit: usize) -> Result<usize, EngineError> {
        let batch: Vec<Entity> = {
            let mut pending = self.pending.lock().expect("pending lock");
            let take = limit.min(pending.len());
            pending.drain(..take).collect()
        };
        if batch.is_empty() {
            return Ok(0);
        }

        let inputs: Vec<String> = batch.iter().map(embedding_input).collect();
        let vectors = self.provider.embed_batch(&inputs);
        let mut written = 0usize;
        for (entity, vector) in batch.iter().zip(vectors) {
            self.store.upsert(&entity.id, &vector)?;
            written += 1;
        }
        self.stats.lock().expect("stats lock").embedded += written as u64;
        Ok(written)
    }

    /// Drain the whole backlog (synchronous; used by tests and small indexes).
    pub fn embed_all_pending(&self) -> Result<usize, EngineError> {
        let mut total = 0;
        loop {
            let written = self.embed_pending(256)?;
            if written == 0 {
                break;
            }
            total += written;
        }
        Ok(total)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().expect("pending lock").len()
    }

    pub fn stats(&self) -> SemanticStats {
        let mut stats = self.stats.lock().expect("stats lock").clone();
        stats.pending = self.pending_len();
        stats
    }
}
