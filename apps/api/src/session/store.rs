//! Session persistence boundary.
//!
//! Every method is one atomic operation from the caller's point of view. In
//! particular [`SessionStore::record_score`] checks the run epoch, inserts the
//! result, bumps `processed_count` and flips the session to `completed` together,
//! so no observer can see a result without its count or a count above the total.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use super::models::{
    AnalysisSession, NewScore, NewSession, NewTarget, RecordOutcome, ScoreRecord, SessionStatus,
    SessionTarget, SubmitOutcome,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session {0} not found")]
    NotFound(Uuid),

    #[error("Invalid session transition {from} -> {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("Document {document_id} is not a target of session {session_id}")]
    UnknownTarget { session_id: Uuid, document_id: Uuid },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt session data: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, new: NewSession) -> Result<AnalysisSession, SessionError>;

    async fn get_session(&self, id: Uuid) -> Result<AnalysisSession, SessionError>;

    async fn list_targets(&self, id: Uuid) -> Result<Vec<SessionTarget>, SessionError>;

    /// Adds a document to the session. A file already present (same content hash)
    /// is not added twice. Adding to a terminal session re-opens it to `pending`.
    async fn add_target(&self, id: Uuid, target: NewTarget)
        -> Result<SubmitOutcome, SessionError>;

    /// `pending | processing → processing`, re-syncing `processed_count` to the
    /// number of persisted results. Returns `None` for terminal sessions. A session
    /// with nothing left to score goes straight to `completed`.
    async fn begin_processing(&self, id: Uuid) -> Result<Option<AnalysisSession>, SessionError>;

    async fn update_session_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        error: Option<String>,
    ) -> Result<AnalysisSession, SessionError>;

    async fn record_score(
        &self,
        id: Uuid,
        run_epoch: u32,
        score: NewScore,
    ) -> Result<RecordOutcome, SessionError>;

    async fn get_score(
        &self,
        id: Uuid,
        document_id: Uuid,
    ) -> Result<Option<ScoreRecord>, SessionError>;

    /// Results ordered by overall fit, best first.
    async fn list_scores(&self, id: Uuid) -> Result<Vec<ScoreRecord>, SessionError>;

    /// Clears all results, returns to `pending` and bumps `run_epoch`.
    async fn reset_session(&self, id: Uuid) -> Result<AnalysisSession, SessionError>;

    async fn delete_session(&self, id: Uuid) -> Result<(), SessionError>;
}

/// Orders results best-first; ties keep the order they were recorded in.
pub fn sort_scores(scores: &mut [ScoreRecord]) {
    scores.sort_by(|a, b| {
        b.result
            .overall_fit
            .cmp(&a.result.overall_fit)
            .then(a.created_at.cmp(&b.created_at))
    });
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory store
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct SessionEntry {
    session: AnalysisSession,
    targets: Vec<SessionTarget>,
    scores: Vec<ScoreRecord>,
}

impl SessionEntry {
    fn score_for(&self, document_id: Uuid) -> Option<&ScoreRecord> {
        self.scores.iter().find(|s| s.document_id == document_id)
    }

    fn touch(&mut self) {
        self.session.updated_at = Utc::now();
    }

    fn push_target(&mut self, target: NewTarget) -> SessionTarget {
        let target = SessionTarget {
            document_id: target.document_id,
            session_id: self.session.id,
            filename: target.filename,
            media_type: target.media_type,
            storage_key: target.storage_key,
            content_hash: target.content_hash,
            created_at: Utc::now(),
        };
        self.targets.push(target.clone());
        self.session.total_count = self.targets.len() as u32;
        target
    }
}

/// Single-process store for tests and local runs. One mutex guards everything,
/// which makes every operation trivially atomic.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<Uuid, SessionEntry>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut SessionEntry) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        f(entry)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, new: NewSession) -> Result<AnalysisSession, SessionError> {
        let now = Utc::now();
        let session = AnalysisSession {
            id: Uuid::new_v4(),
            owner: new.owner,
            name: new.name,
            job_description: new.job_description,
            status: SessionStatus::Pending,
            processed_count: 0,
            total_count: 0,
            run_epoch: 0,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        let mut entry = SessionEntry {
            session,
            targets: Vec::new(),
            scores: Vec::new(),
        };
        for target in new.targets {
            if !entry
                .targets
                .iter()
                .any(|t| t.content_hash == target.content_hash)
            {
                entry.push_target(target);
            }
        }

        let session = entry.session.clone();
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(session.id, entry);
        Ok(session)
    }

    async fn get_session(&self, id: Uuid) -> Result<AnalysisSession, SessionError> {
        self.with_entry(id, |entry| Ok(entry.session.clone()))
    }

    async fn list_targets(&self, id: Uuid) -> Result<Vec<SessionTarget>, SessionError> {
        self.with_entry(id, |entry| Ok(entry.targets.clone()))
    }

    async fn add_target(
        &self,
        id: Uuid,
        target: NewTarget,
    ) -> Result<SubmitOutcome, SessionError> {
        self.with_entry(id, |entry| {
            if let Some(existing) = entry
                .targets
                .iter()
                .find(|t| t.content_hash == target.content_hash)
                .cloned()
            {
                return Ok(match entry.score_for(existing.document_id) {
                    Some(score) => SubmitOutcome::AlreadyScored(score.clone()),
                    None => SubmitOutcome::Queued(existing),
                });
            }

            let added = entry.push_target(target);
            if entry.session.status.is_terminal() {
                entry.session.status = SessionStatus::Pending;
                entry.session.completed_at = None;
                entry.session.error = None;
            }
            entry.touch();
            Ok(SubmitOutcome::Queued(added))
        })
    }

    async fn begin_processing(&self, id: Uuid) -> Result<Option<AnalysisSession>, SessionError> {
        self.with_entry(id, |entry| {
            if entry.session.status.is_terminal() {
                return Ok(None);
            }
            entry.session.processed_count = entry.scores.len() as u32;
            entry.session.total_count = entry.targets.len() as u32;
            if entry.session.processed_count == entry.session.total_count {
                entry.session.status = SessionStatus::Completed;
                entry.session.completed_at = Some(Utc::now());
            } else {
                entry.session.status = SessionStatus::Processing;
            }
            entry.touch();
            Ok(Some(entry.session.clone()))
        })
    }

    async fn update_session_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        error: Option<String>,
    ) -> Result<AnalysisSession, SessionError> {
        self.with_entry(id, |entry| {
            let from = entry.session.status;
            if !from.can_transition_to(status) {
                return Err(SessionError::InvalidTransition { from, to: status });
            }
            entry.session.status = status;
            entry.session.error = error;
            if status.is_terminal() {
                entry.session.completed_at = Some(Utc::now());
            }
            entry.touch();
            Ok(entry.session.clone())
        })
    }

    async fn record_score(
        &self,
        id: Uuid,
        run_epoch: u32,
        score: NewScore,
    ) -> Result<RecordOutcome, SessionError> {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(entry) = sessions.get_mut(&id) else {
            return Ok(RecordOutcome::Stale);
        };
        if entry.session.run_epoch != run_epoch
            || entry.session.status != SessionStatus::Processing
        {
            return Ok(RecordOutcome::Stale);
        }
        if !entry.targets.iter().any(|t| t.document_id == score.document_id) {
            return Err(SessionError::UnknownTarget {
                session_id: id,
                document_id: score.document_id,
            });
        }
        if entry.score_for(score.document_id).is_some() {
            return Ok(RecordOutcome::AlreadyScored);
        }

        entry.scores.push(ScoreRecord {
            session_id: id,
            document_id: score.document_id,
            candidate_name: score.candidate_name,
            candidate_email: score.candidate_email,
            candidate_phone: score.candidate_phone,
            best_distance: score.best_distance,
            result: score.result,
            created_at: Utc::now(),
        });
        entry.session.processed_count += 1;
        if entry.session.processed_count == entry.session.total_count {
            entry.session.status = SessionStatus::Completed;
            entry.session.completed_at = Some(Utc::now());
        }
        entry.touch();

        Ok(RecordOutcome::Recorded {
            processed_count: entry.session.processed_count,
            status: entry.session.status,
        })
    }

    async fn get_score(
        &self,
        id: Uuid,
        document_id: Uuid,
    ) -> Result<Option<ScoreRecord>, SessionError> {
        self.with_entry(id, |entry| Ok(entry.score_for(document_id).cloned()))
    }

    async fn list_scores(&self, id: Uuid) -> Result<Vec<ScoreRecord>, SessionError> {
        let mut scores = self.with_entry(id, |entry| Ok(entry.scores.clone()))?;
        sort_scores(&mut scores);
        Ok(scores)
    }

    async fn reset_session(&self, id: Uuid) -> Result<AnalysisSession, SessionError> {
        self.with_entry(id, |entry| {
            entry.scores.clear();
            entry.session.processed_count = 0;
            entry.session.status = SessionStatus::Pending;
            entry.session.run_epoch += 1;
            entry.session.error = None;
            entry.session.completed_at = None;
            entry.touch();
            Ok(entry.session.clone())
        })
    }

    async fn delete_session(&self, id: Uuid) -> Result<(), SessionError> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id)
            .map(|_| ())
            .ok_or(SessionError::NotFound(id))
    }
}
