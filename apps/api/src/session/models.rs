use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::scorer::ScoreResult;

/// `pending → processing → {completed, failed}`; terminal states re-open to
/// `pending` only through a reset or a new target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Processing => "processing",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }

    /// Transitions a caller may request explicitly. `processing → completed` is also
    /// reachable through `record_score`, and `* → pending` through a reset.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Processing, Completed) | (Processing, Failed) | (_, Pending)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SessionStatus::Pending),
            "processing" => Ok(SessionStatus::Processing),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSession {
    pub id: Uuid,
    /// Ownership tag only; no access control is derived from it.
    pub owner: String,
    pub name: String,
    pub job_description: String,
    pub status: SessionStatus,
    pub processed_count: u32,
    pub total_count: u32,
    /// Bumped on every reset. In-flight runs holding an older epoch are stale.
    pub run_epoch: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionTarget {
    pub document_id: Uuid,
    pub session_id: Uuid,
    pub filename: String,
    pub media_type: String,
    pub storage_key: String,
    /// SHA-256 of the uploaded bytes; identifies re-submissions of the same file.
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSession {
    pub owner: String,
    pub name: String,
    pub job_description: String,
    #[serde(default)]
    pub targets: Vec<NewTarget>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTarget {
    pub document_id: Uuid,
    pub filename: String,
    pub media_type: String,
    pub storage_key: String,
    pub content_hash: String,
}

/// A persisted verdict for one (session, document) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRecord {
    pub session_id: Uuid,
    pub document_id: Uuid,
    pub candidate_name: String,
    pub candidate_email: Option<String>,
    pub candidate_phone: Option<String>,
    /// Retrieval distance; `None` when the document never made it into the index.
    pub best_distance: Option<f32>,
    #[serde(flatten)]
    pub result: ScoreResult,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewScore {
    pub document_id: Uuid,
    pub candidate_name: String,
    pub candidate_email: Option<String>,
    pub candidate_phone: Option<String>,
    pub best_distance: Option<f32>,
    pub result: ScoreResult,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The target is part of the session and waiting to be scored.
    Queued(SessionTarget),
    /// The same file was already scored in this session; nothing changes.
    AlreadyScored(ScoreRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded {
        processed_count: u32,
        status: SessionStatus,
    },
    /// A result for this document already exists; counters are untouched.
    AlreadyScored,
    /// The session was deleted, reset, or left `processing` underneath the run.
    Stale,
}
