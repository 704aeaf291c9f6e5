use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::pipeline::scorer::{Degradation, ScoreResult};
use crate::session::models::{AnalysisSession, ScoreRecord, SessionTarget};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AnalysisSessionRow {
    pub id: Uuid,
    pub owner: String,
    pub name: String,
    pub job_description: String,
    pub status: String,
    pub processed_count: i32,
    pub total_count: i32,
    pub run_epoch: i32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionTargetRow {
    pub document_id: Uuid,
    pub session_id: Uuid,
    pub filename: String,
    pub media_type: String,
    pub storage_key: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScoreResultRow {
    pub session_id: Uuid,
    pub document_id: Uuid,
    pub candidate_name: String,
    pub candidate_email: Option<String>,
    pub candidate_phone: Option<String>,
    pub best_distance: Option<f32>,
    pub skill_match: i16,
    pub project_relevance: i16,
    pub problem_solving: i16,
    pub tools: i16,
    pub overall_fit: i16,
    pub summary: String,
    pub degradation: String,
    pub created_at: DateTime<Utc>,
}

fn count(value: i32, column: &str) -> Result<u32, String> {
    u32::try_from(value).map_err(|_| format!("{column} is negative: {value}"))
}

fn score(value: i16, column: &str) -> Result<u8, String> {
    u8::try_from(value)
        .ok()
        .filter(|v| *v <= 100)
        .ok_or_else(|| format!("{column} out of range: {value}"))
}

impl TryFrom<AnalysisSessionRow> for AnalysisSession {
    type Error = String;

    fn try_from(row: AnalysisSessionRow) -> Result<Self, Self::Error> {
        Ok(AnalysisSession {
            id: row.id,
            owner: row.owner,
            name: row.name,
            job_description: row.job_description,
            status: row.status.parse()?,
            processed_count: count(row.processed_count, "processed_count")?,
            total_count: count(row.total_count, "total_count")?,
            run_epoch: count(row.run_epoch, "run_epoch")?,
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

impl From<SessionTargetRow> for SessionTarget {
    fn from(row: SessionTargetRow) -> Self {
        SessionTarget {
            document_id: row.document_id,
            session_id: row.session_id,
            filename: row.filename,
            media_type: row.media_type,
            storage_key: row.storage_key,
            content_hash: row.content_hash,
            created_at: row.created_at,
        }
    }
}

impl TryFrom<ScoreResultRow> for ScoreRecord {
    type Error = String;

    fn try_from(row: ScoreResultRow) -> Result<Self, Self::Error> {
        Ok(ScoreRecord {
            session_id: row.session_id,
            document_id: row.document_id,
            candidate_name: row.candidate_name,
            candidate_email: row.candidate_email,
            candidate_phone: row.candidate_phone,
            best_distance: row.best_distance,
            result: ScoreResult {
                skill_match: score(row.skill_match, "skill_match")?,
                project_relevance: score(row.project_relevance, "project_relevance")?,
                problem_solving: score(row.problem_solving, "problem_solving")?,
                tools: score(row.tools, "tools")?,
                overall_fit: score(row.overall_fit, "overall_fit")?,
                summary: row.summary,
                degradation: row.degradation.parse::<Degradation>()?,
            },
            created_at: row.created_at,
        })
    }
}
