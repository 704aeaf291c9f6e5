//! Candidate Ranker: shortlists documents for a job description.
//!
//! Over-fetches chunks from the index, groups them by source document and ranks
//! each document by its single best (minimum-distance) chunk. The surfaced
//! candidates then get their own top chunks, which become the bounded summary
//! handed to the scorer.
//!
//! A long resume can fill the whole over-fetch on its own. When fewer than
//! `k_candidates` documents surface, the indexed documents that were crowded out
//! are measured directly, so every indexed document still gets a real distance.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::chunker::Chunk;
use super::embedding::Embedder;
use super::index::{IndexError, QueryHits, ScoredChunk, SemanticIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankerConfig {
    /// Chunks fetched per requested candidate.
    pub overfetch_factor: usize,
    /// Chunks per candidate used to build the scoring summary.
    pub chunks_per_candidate: usize,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            overfetch_factor: 5,
            chunks_per_candidate: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedCandidate {
    pub document_id: String,
    pub best_distance: f32,
    pub top_chunks: Vec<Chunk>,
}

impl RankedCandidate {
    /// Top chunks joined in distance order.
    pub fn summary(&self) -> String {
        self.top_chunks
            .iter()
            .map(|c| c.text.trim())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Clone, Default)]
pub struct CandidateRanker {
    config: RankerConfig,
}

impl CandidateRanker {
    pub fn new(config: RankerConfig) -> Self {
        Self { config }
    }

    /// Ranks up to `k_candidates` documents, ascending by best distance.
    pub async fn rank(
        &self,
        index: &SemanticIndex,
        embedder: &dyn Embedder,
        job_description: &str,
        k_candidates: usize,
    ) -> Result<Vec<RankedCandidate>, IndexError> {
        if k_candidates == 0 || index.is_empty() {
            return Ok(Vec::new());
        }

        let fetch = k_candidates.saturating_mul(self.config.overfetch_factor.max(1));
        let QueryHits { embedding, hits } = index.query(embedder, job_description, fetch).await?;

        let mut best = group_by_document(&hits, k_candidates);
        if best.len() < k_candidates {
            let surfaced: HashSet<String> = best.iter().map(|(id, _)| id.clone()).collect();
            for document_id in index.document_ids() {
                if surfaced.contains(document_id) {
                    continue;
                }
                if let Some(hit) = index.nearest_in_document(&embedding, document_id, 1).first() {
                    best.push((document_id.to_string(), hit.distance));
                }
            }
            // Stable: crowded-out documents never overtake a retrieved one on a tie.
            best.sort_by(|a, b| a.1.total_cmp(&b.1));
            best.truncate(k_candidates);
        }

        let ranked = best
            .into_iter()
            .map(|(document_id, best_distance)| {
                let top_chunks = index
                    .nearest_in_document(&embedding, &document_id, self.config.chunks_per_candidate)
                    .into_iter()
                    .map(|hit| hit.chunk)
                    .collect();
                RankedCandidate {
                    document_id,
                    best_distance,
                    top_chunks,
                }
            })
            .collect();

        Ok(ranked)
    }
}

/// Collapses hits to `(document_id, min distance)`, sorted ascending and truncated.
/// Documents with equal distance keep the order in which they were first retrieved.
pub fn group_by_document(hits: &[ScoredChunk], k_candidates: usize) -> Vec<(String, f32)> {
    let mut best: Vec<(String, f32)> = Vec::new();
    let mut position: HashMap<&str, usize> = HashMap::new();

    for hit in hits {
        let document_id = hit.chunk.document_id();
        match position.get(document_id) {
            Some(&i) => {
                if hit.distance < best[i].1 {
                    best[i].1 = hit.distance;
                }
            }
            None => {
                position.insert(document_id, best.len());
                best.push((document_id.to_string(), hit.distance));
            }
        }
    }

    best.sort_by(|a, b| a.1.total_cmp(&b.1));
    best.truncate(k_candidates);
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::chunker::{Chunker, ChunkerConfig};
    use crate::pipeline::embedding::HashingEmbedder;

    fn hit(document_id: &str, distance: f32) -> ScoredChunk {
        let chunk = Chunker::default().chunk(document_id, "text").remove(0);
        ScoredChunk { chunk, distance }
    }

    #[test]
    fn test_grouping_uses_minimum_distance() {
        let hits = vec![
            hit("a", 0.40),
            hit("b", 0.10),
            hit("a", 0.05),
            hit("c", 0.30),
            hit("a", 0.90),
        ];
        let grouped = group_by_document(&hits, 10);
        assert_eq!(
            grouped,
            vec![
                ("a".to_string(), 0.05),
                ("b".to_string(), 0.10),
                ("c".to_string(), 0.30),
            ]
        );
    }

    #[test]
    fn test_grouping_truncates_to_k() {
        let hits = vec![hit("a", 0.3), hit("b", 0.2), hit("c", 0.1)];
        let grouped = group_by_document(&hits, 2);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].0, "c");
    }

    async fn build_index(docs: &[(&str, &str)]) -> (SemanticIndex, HashingEmbedder) {
        let embedder = HashingEmbedder::default();
        let chunker = Chunker::new(ChunkerConfig {
            size: 200,
            overlap: 40,
        });
        let chunks = docs
            .iter()
            .flat_map(|(id, text)| chunker.chunk(id, text))
            .collect();
        let (index, _) = SemanticIndex::build(&embedder, chunks).await;
        (index, embedder)
    }

    #[tokio::test]
    async fn test_keyword_match_ranks_first() {
        let (index, embedder) = build_index(&[
            (
                "generic-1",
                "Team player with strong communication skills. Organised office events and \
                 handled customer calls.",
            ),
            (
                "match",
                "Backend engineer. Five years of Python experience building APIs on \
                 PostgreSQL, including schema design and query tuning.",
            ),
            (
                "generic-2",
                "Retail associate. Managed store inventory, cash handling and weekend shifts.",
            ),
        ])
        .await;

        let jd = "Seeking a backend engineer with Python and PostgreSQL experience";
        let ranked = CandidateRanker::default()
            .rank(&index, &embedder, jd, 2)
            .await
            .unwrap();

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].document_id, "match");
        assert!(ranked[0].best_distance < ranked[1].best_distance);
        assert!(ranked[0].summary().contains("PostgreSQL"));
    }

    #[tokio::test]
    async fn test_ranking_is_deterministic() {
        let docs = [
            ("a", "Rust systems programmer, async networking, tokio"),
            ("b", "Python data engineer, Airflow, Spark"),
            ("c", "Go backend developer, gRPC, PostgreSQL"),
        ];
        let (index, embedder) = build_index(&docs).await;
        let ranker = CandidateRanker::default();

        let first = ranker.rank(&index, &embedder, "backend developer", 3).await.unwrap();
        let second = ranker.rank(&index, &embedder, "backend developer", 3).await.unwrap();
        let pairs = |r: &[RankedCandidate]| {
            r.iter()
                .map(|c| (c.document_id.clone(), c.best_distance))
                .collect::<Vec<_>>()
        };
        assert_eq!(pairs(&first), pairs(&second));
    }

    #[tokio::test]
    async fn test_top_chunks_are_bounded() {
        let long = "Python PostgreSQL backend. ".repeat(100);
        let (index, embedder) = build_index(&[("long", &long)]).await;
        let ranked = CandidateRanker::default()
            .rank(&index, &embedder, "Python", 1)
            .await
            .unwrap();
        assert_eq!(ranked[0].top_chunks.len(), 5);
    }

    #[tokio::test]
    async fn test_long_document_does_not_crowd_out_others() {
        let long = "Python PostgreSQL backend engineer. ".repeat(200);
        let (index, embedder) = build_index(&[
            ("long", &long),
            ("weak", "Retail associate. Stocked shelves and ran the till."),
            ("mid", "Backend engineer building Java services."),
        ])
        .await;
        let jd = "Seeking a backend engineer with Python and PostgreSQL experience";

        let fetch = 3 * RankerConfig::default().overfetch_factor;
        let hits = index.query(&embedder, jd, fetch).await.unwrap().hits;
        assert!(hits.iter().all(|h| h.chunk.document_id() == "long"));

        let ranked = CandidateRanker::default()
            .rank(&index, &embedder, jd, 3)
            .await
            .unwrap();
        let order: Vec<&str> = ranked.iter().map(|c| c.document_id.as_str()).collect();
        assert_eq!(order, vec!["long", "mid", "weak"]);
        assert!(ranked.windows(2).all(|w| w[0].best_distance <= w[1].best_distance));
        assert!(ranked[1].summary().contains("Java"));
    }

    #[tokio::test]
    async fn test_empty_index_ranks_nothing() {
        let embedder = HashingEmbedder::default();
        let ranked = CandidateRanker::default()
            .rank(&SemanticIndex::default(), &embedder, "anything", 3)
            .await
            .unwrap();
        assert!(ranked.is_empty());
    }
}
