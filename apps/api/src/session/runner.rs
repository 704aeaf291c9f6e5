//! Drives one Analysis Session from `pending` to a terminal state.
//!
//! A run loads every unscored target, extracts and chunks it, builds and
//! publishes a fresh index, ranks the documents against the job description and
//! scores them one at a time in ranked order. Ranking reads the index back from
//! the registry, and the index is evicted when the run ends. Each result is
//! persisted through [`SessionStore::record_score`], which also detects a reset or
//! deletion that happened underneath the run; the run then stops without error.
//!
//! Only session-level faults (store failures, corrupt session data) mark the
//! session `failed`. Storage misses, extraction failures, embedding failures and
//! scoring failures are all absorbed per candidate.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::models::{AnalysisSession, NewScore, RecordOutcome, SessionStatus, SessionTarget};
use super::store::{SessionError, SessionStore};
use crate::pipeline::chunker::{CandidateMetadata, Chunker};
use crate::pipeline::embedding::Embedder;
use crate::pipeline::extract::{self, ExtractedText, ExtractionStrategy, MIME_TEXT};
use crate::pipeline::identity::CandidateIdentity;
use crate::pipeline::index::{IndexRegistry, SemanticIndex};
use crate::pipeline::ranker::{CandidateRanker, RankedCandidate};
use crate::pipeline::scorer::CandidateScorer;
use crate::storage::{synthetic_resume_text, ObjectStore};

/// Targets added while a run is in progress are picked up by later passes.
const MAX_PASSES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { processed: u32, total: u32 },
    /// Passes ran out while targets were still being added; a re-run finishes them.
    Incomplete { processed: u32, total: u32 },
    /// The session was already terminal.
    Skipped,
    /// The session was reset or deleted while the run was in flight.
    Abandoned,
    Failed(String),
}

/// A target ready for ranking and scoring.
struct PreparedDocument {
    target: SessionTarget,
    text: String,
    metadata: CandidateMetadata,
}

/// A document in scoring order, with the text the scorer will see.
struct ScoringCandidate<'a> {
    document: &'a PreparedDocument,
    best_distance: Option<f32>,
    summary: String,
}

enum Control {
    Continue,
    Stop(RunOutcome),
}

#[derive(Clone)]
pub struct AnalysisPipeline {
    store: Arc<dyn SessionStore>,
    objects: Arc<dyn ObjectStore>,
    embedder: Arc<dyn Embedder>,
    scorer: Arc<dyn CandidateScorer>,
    indexes: Arc<IndexRegistry>,
    chunker: Chunker,
    ranker: CandidateRanker,
}

impl AnalysisPipeline {
    pub fn new(
        store: Arc<dyn SessionStore>,
        objects: Arc<dyn ObjectStore>,
        embedder: Arc<dyn Embedder>,
        scorer: Arc<dyn CandidateScorer>,
        indexes: Arc<IndexRegistry>,
        chunker: Chunker,
        ranker: CandidateRanker,
    ) -> Self {
        Self {
            store,
            objects,
            embedder,
            scorer,
            indexes,
            chunker,
            ranker,
        }
    }

    pub fn indexes(&self) -> &Arc<IndexRegistry> {
        &self.indexes
    }

    /// Runs the session to completion. Never returns an error: session-level
    /// faults are recorded on the session and reported as [`RunOutcome::Failed`].
    pub async fn run_session(&self, session_id: Uuid) -> RunOutcome {
        let outcome = self.run_to_outcome(session_id).await;
        self.indexes.evict(session_id);

        match &outcome {
            RunOutcome::Abandoned => {
                warn!("Session {session_id} was reset or deleted mid-run; abandoning")
            }
            other => info!("Session {session_id} run finished: {other:?}"),
        }
        outcome
    }

    async fn run_to_outcome(&self, session_id: Uuid) -> RunOutcome {
        match self.try_run(session_id).await {
            Ok(outcome) => outcome,
            Err(SessionError::NotFound(_)) => RunOutcome::Abandoned,
            Err(e) => {
                error!("Session {session_id} failed: {e}");
                let message = e.to_string();
                match self
                    .store
                    .update_session_status(session_id, SessionStatus::Failed, Some(message.clone()))
                    .await
                {
                    Ok(_) => RunOutcome::Failed(message),
                    Err(SessionError::NotFound(_)) => RunOutcome::Abandoned,
                    Err(mark_err) => {
                        error!("Could not mark session {session_id} failed: {mark_err}");
                        RunOutcome::Failed(message)
                    }
                }
            }
        }
    }

    async fn try_run(&self, session_id: Uuid) -> Result<RunOutcome, SessionError> {
        let Some(session) = self.store.begin_processing(session_id).await? else {
            return Ok(RunOutcome::Skipped);
        };
        info!(
            "Session {} processing: {}/{} already scored",
            session.id, session.processed_count, session.total_count
        );

        for pass in 0..MAX_PASSES {
            let current = self.store.get_session(session_id).await?;
            if current.run_epoch != session.run_epoch {
                return Ok(RunOutcome::Abandoned);
            }
            if current.status == SessionStatus::Completed {
                return Ok(RunOutcome::Completed {
                    processed: current.processed_count,
                    total: current.total_count,
                });
            }
            if current.status != SessionStatus::Processing {
                return Ok(RunOutcome::Abandoned);
            }

            let pending = self.unscored_targets(session_id).await?;
            if pending.is_empty() {
                break;
            }
            info!(
                "Session {session_id} pass {}: {} candidates to score",
                pass + 1,
                pending.len()
            );

            if let Control::Stop(outcome) = self.run_pass(&session, pending).await? {
                return Ok(outcome);
            }
        }

        let latest = self.store.get_session(session_id).await?;
        Ok(match latest.status {
            _ if latest.run_epoch != session.run_epoch => RunOutcome::Abandoned,
            SessionStatus::Completed => RunOutcome::Completed {
                processed: latest.processed_count,
                total: latest.total_count,
            },
            SessionStatus::Processing => RunOutcome::Incomplete {
                processed: latest.processed_count,
                total: latest.total_count,
            },
            _ => RunOutcome::Abandoned,
        })
    }

    async fn unscored_targets(&self, session_id: Uuid) -> Result<Vec<SessionTarget>, SessionError> {
        let scored: HashSet<Uuid> = self
            .store
            .list_scores(session_id)
            .await?
            .into_iter()
            .map(|s| s.document_id)
            .collect();
        Ok(self
            .store
            .list_targets(session_id)
            .await?
            .into_iter()
            .filter(|t| !scored.contains(&t.document_id))
            .collect())
    }

    async fn run_pass(
        &self,
        session: &AnalysisSession,
        pending: Vec<SessionTarget>,
    ) -> Result<Control, SessionError> {
        let mut documents = Vec::with_capacity(pending.len());
        for target in pending {
            documents.push(self.prepare(target).await);
        }

        let chunks = documents
            .iter()
            .flat_map(|doc| {
                self.chunker
                    .chunk(&doc.target.document_id.to_string(), &doc.text)
            })
            .collect();
        let (index, report) = SemanticIndex::build(self.embedder.as_ref(), chunks).await;
        for skipped in &report.skipped_documents {
            warn!("Session {}: document {skipped} left out of the index", session.id);
        }
        info!(
            "Session {}: publishing index ({} chunks, {})",
            session.id,
            index.len(),
            index.model()
        );
        self.indexes.publish(session.id, index);

        // A reset or delete evicts the index; nothing left to rank for this run.
        let Some(index) = self.indexes.get(session.id) else {
            return Ok(Control::Stop(RunOutcome::Abandoned));
        };
        let ranked = match self
            .ranker
            .rank(&index, self.embedder.as_ref(), &session.job_description, documents.len())
            .await
        {
            Ok(ranked) => ranked,
            Err(e) => {
                warn!(
                    "Session {}: ranking failed ({e}); scoring in upload order",
                    session.id
                );
                Vec::new()
            }
        };

        for candidate in scoring_order(&documents, ranked) {
            if !self.still_current(session).await? {
                return Ok(Control::Stop(RunOutcome::Abandoned));
            }

            let result = self
                .scorer
                .score(&session.job_description, &candidate.summary)
                .await;
            if result.is_degraded() {
                warn!(
                    "Session {}: degraded score ({}) for document {}",
                    session.id,
                    result.degradation.as_str(),
                    candidate.document.target.document_id
                );
            }

            let metadata = &candidate.document.metadata;
            let score = NewScore {
                document_id: candidate.document.target.document_id,
                candidate_name: metadata.best_effort_name.clone(),
                candidate_email: metadata.best_effort_email.clone(),
                candidate_phone: metadata.best_effort_phone.clone(),
                best_distance: candidate.best_distance,
                result,
            };

            match self
                .store
                .record_score(session.id, session.run_epoch, score)
                .await?
            {
                RecordOutcome::Recorded {
                    processed_count,
                    status,
                } => {
                    info!(
                        "Session {}: scored {} ({processed_count}/{})",
                        session.id, candidate.document.target.filename, session.total_count
                    );
                    if status == SessionStatus::Completed {
                        let done = self.store.get_session(session.id).await?;
                        return Ok(Control::Stop(RunOutcome::Completed {
                            processed: done.processed_count,
                            total: done.total_count,
                        }));
                    }
                }
                RecordOutcome::AlreadyScored => {}
                RecordOutcome::Stale => return Ok(Control::Stop(RunOutcome::Abandoned)),
            }
        }

        Ok(Control::Continue)
    }

    /// Cheap pre-check so a reset session stops spending scoring calls. The
    /// authoritative check happens inside `record_score`.
    async fn still_current(&self, session: &AnalysisSession) -> Result<bool, SessionError> {
        match self.store.get_session(session.id).await {
            Ok(current) => Ok(current.run_epoch == session.run_epoch
                && current.status == SessionStatus::Processing),
            Err(SessionError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn prepare(&self, target: SessionTarget) -> PreparedDocument {
        let (bytes, media_type) = match self.objects.get(&target.storage_key).await {
            Ok(bytes) => (bytes, target.media_type.clone()),
            Err(e) => {
                warn!(
                    "Could not load {} for document {} ({e}); using synthetic content",
                    target.storage_key, target.document_id
                );
                (
                    Bytes::from(synthetic_resume_text(&target.filename)),
                    MIME_TEXT.to_string(),
                )
            }
        };

        let extracted = tokio::task::spawn_blocking(move || extract::extract(&bytes, &media_type))
            .await
            .unwrap_or_else(|e| {
                warn!("Extraction task for document {} died: {e}", target.document_id);
                ExtractedText {
                    text: extract::EXTRACTION_FAILED_TEXT.to_string(),
                    strategy: ExtractionStrategy::Failed,
                }
            });
        if extracted.is_failed() {
            warn!(
                "No readable text in {} (document {}); scoring placeholder text",
                target.filename, target.document_id
            );
        }

        let identity = CandidateIdentity::from_text(&extracted.text);
        PreparedDocument {
            metadata: CandidateMetadata {
                source_document_id: target.document_id.to_string(),
                best_effort_name: identity.name,
                best_effort_email: identity.email,
                best_effort_phone: identity.phone,
            },
            text: extracted.text,
            target,
        }
    }
}

/// Ranked documents first (best distance ascending), then documents left out of
/// the index (failed embedding or no text), in upload order.
fn scoring_order(
    documents: &[PreparedDocument],
    ranked: Vec<RankedCandidate>,
) -> Vec<ScoringCandidate<'_>> {
    let by_id: HashMap<String, &PreparedDocument> = documents
        .iter()
        .map(|doc| (doc.target.document_id.to_string(), doc))
        .collect();

    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut order = Vec::with_capacity(documents.len());

    for candidate in ranked {
        let Some(document) = by_id.get(&candidate.document_id).copied() else {
            continue;
        };
        if seen.insert(document.target.document_id) {
            order.push(ScoringCandidate {
                document,
                best_distance: Some(candidate.best_distance),
                summary: candidate.summary(),
            });
        }
    }

    for document in documents {
        if seen.insert(document.target.document_id) {
            order.push(ScoringCandidate {
                document,
                best_distance: None,
                summary: document.text.clone(),
            });
        }
    }

    order
}
