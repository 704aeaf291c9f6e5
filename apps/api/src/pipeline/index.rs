//! In-memory nearest-neighbour index over chunk embeddings.
//!
//! The index is a cache: it is built wholesale from a set of chunks, queried
//! read-only, and rebuilt from scratch when the working set changes. There is no
//! incremental delete. Finished indexes are published through [`IndexRegistry`]
//! as `Arc<SemanticIndex>`, so a reader only ever sees a fully built index.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::chunker::Chunk;
use super::embedding::{cosine_distance, Embedder, EmbeddingError};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// A query hit. `distance` is cosine distance; only its ordering is meaningful.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub distance: f32,
}

/// What happened during [`SemanticIndex::build`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub indexed_chunks: usize,
    pub indexed_documents: usize,
    /// Documents left out because one of their chunks failed to embed.
    pub skipped_documents: Vec<String>,
}

/// Result of [`SemanticIndex::query`]. The query embedding is kept so follow-up
/// lookups against the same index do not embed the text again.
#[derive(Debug, Clone)]
pub struct QueryHits {
    pub embedding: Vec<f32>,
    pub hits: Vec<ScoredChunk>,
}

#[derive(Debug, Clone, Default)]
pub struct SemanticIndex {
    model: String,
    entries: Vec<IndexEntry>,
}

impl SemanticIndex {
    /// Embeds every chunk, one call per chunk. A document whose chunk fails to
    /// embed is dropped from this build entirely; the rest of the build proceeds.
    pub async fn build(embedder: &dyn Embedder, chunks: Vec<Chunk>) -> (Self, BuildReport) {
        let mut entries: Vec<IndexEntry> = Vec::with_capacity(chunks.len());
        let mut skipped: HashSet<String> = HashSet::new();
        let mut skipped_order: Vec<String> = Vec::new();

        for chunk in chunks {
            let document_id = chunk.document_id().to_string();
            if skipped.contains(&document_id) {
                continue;
            }
            match embedder.embed(&chunk.text).await {
                Ok(embedding) => entries.push(IndexEntry { chunk, embedding }),
                Err(e) => {
                    warn!(
                        "Embedding failed for chunk {} of document {}: {}; excluding document from index",
                        chunk.chunk_index, document_id, e
                    );
                    skipped.insert(document_id.clone());
                    skipped_order.push(document_id);
                }
            }
        }

        entries.retain(|entry| !skipped.contains(entry.chunk.document_id()));

        let indexed_documents = entries
            .iter()
            .map(|entry| entry.chunk.document_id())
            .collect::<HashSet<_>>()
            .len();
        let report = BuildReport {
            indexed_chunks: entries.len(),
            indexed_documents,
            skipped_documents: skipped_order,
        };

        info!(
            "Built semantic index: {} chunks across {} documents ({} skipped)",
            report.indexed_chunks,
            report.indexed_documents,
            report.skipped_documents.len()
        );

        (
            Self {
                model: embedder.model_name().to_string(),
                entries,
            },
            report,
        )
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Documents with at least one indexed chunk, in insertion order.
    pub fn document_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .map(|entry| entry.chunk.document_id())
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// The `k` nearest chunks to `query`, ascending by distance. Equal distances
    /// keep insertion order, so results are deterministic.
    fn nearest(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        self.rank_entries(query, self.entries.iter(), k)
    }

    /// The `n` nearest chunks belonging to one document.
    pub fn nearest_in_document(&self, query: &[f32], document_id: &str, n: usize) -> Vec<ScoredChunk> {
        let entries = self
            .entries
            .iter()
            .filter(|entry| entry.chunk.document_id() == document_id);
        self.rank_entries(query, entries, n)
    }

    /// Embeds `text` and returns its `k` nearest chunks, ascending by distance.
    pub async fn query(
        &self,
        embedder: &dyn Embedder,
        text: &str,
        k: usize,
    ) -> Result<QueryHits, IndexError> {
        let embedding = embedder.embed(text).await?;
        let hits = self.nearest(&embedding, k);
        Ok(QueryHits { embedding, hits })
    }

    fn rank_entries<'a>(
        &self,
        query: &[f32],
        entries: impl Iterator<Item = &'a IndexEntry>,
        k: usize,
    ) -> Vec<ScoredChunk> {
        let mut scored: Vec<(f32, &IndexEntry)> = entries
            .map(|entry| (cosine_distance(query, &entry.embedding), entry))
            .collect();
        // sort_by is stable: ties keep insertion order.
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored
            .into_iter()
            .take(k)
            .map(|(distance, entry)| ScoredChunk {
                chunk: entry.chunk.clone(),
                distance,
            })
            .collect()
    }
}

/// Publish-on-complete handle for per-session indexes. The lock is held only to
/// swap or clone an `Arc`, never across an await.
///
/// An index lives here only while its session is being analysed: the run evicts
/// it when it finishes, and reset/delete evict it early.
#[derive(Debug, Default)]
pub struct IndexRegistry {
    indexes: RwLock<HashMap<Uuid, Arc<SemanticIndex>>>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the session's index with a fully built one.
    pub fn publish(&self, session_id: Uuid, index: SemanticIndex) {
        self.indexes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(session_id, Arc::new(index));
    }

    pub fn get(&self, session_id: Uuid) -> Option<Arc<SemanticIndex>> {
        self.indexes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&session_id)
            .cloned()
    }

    pub fn evict(&self, session_id: Uuid) {
        self.indexes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&session_id);
    }
}
