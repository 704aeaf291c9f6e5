//! PostgreSQL-backed [`SessionStore`]. Multi-step operations run in one
//! transaction with the session row locked (`SELECT ... FOR UPDATE`).

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use super::models::{
    AnalysisSession, NewScore, NewSession, NewTarget, RecordOutcome, ScoreRecord, SessionStatus,
    SessionTarget, SubmitOutcome,
};
use super::store::{SessionError, SessionStore};
use crate::models::session::{AnalysisSessionRow, ScoreResultRow, SessionTargetRow};

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_session(row: AnalysisSessionRow) -> Result<AnalysisSession, SessionError> {
    AnalysisSession::try_from(row).map_err(SessionError::Corrupt)
}

fn to_score(row: ScoreResultRow) -> Result<ScoreRecord, SessionError> {
    ScoreRecord::try_from(row).map_err(SessionError::Corrupt)
}

async fn lock_session(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<AnalysisSessionRow>, SessionError> {
    Ok(
        sqlx::query_as::<_, AnalysisSessionRow>(
            "SELECT * FROM analysis_sessions WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?,
    )
}

async fn insert_target(
    tx: &mut Transaction<'_, Postgres>,
    session_id: Uuid,
    target: &NewTarget,
) -> Result<Option<SessionTargetRow>, SessionError> {
    Ok(sqlx::query_as::<_, SessionTargetRow>(
        r#"
        INSERT INTO session_targets
            (document_id, session_id, filename, media_type, storage_key, content_hash)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (session_id, content_hash) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(target.document_id)
    .bind(session_id)
    .bind(&target.filename)
    .bind(&target.media_type)
    .bind(&target.storage_key)
    .bind(&target.content_hash)
    .fetch_optional(&mut **tx)
    .await?)
}

/// Inserts a result unless the (session, document) pair already has one.
/// Returns `false` when a result already existed.
async fn upsert_score_result(
    tx: &mut Transaction<'_, Postgres>,
    session_id: Uuid,
    score: &NewScore,
) -> Result<bool, SessionError> {
    let result = &score.result;
    let inserted = sqlx::query(
        r#"
        INSERT INTO score_results
            (session_id, document_id, candidate_name, candidate_email, candidate_phone,
             best_distance, skill_match, project_relevance, problem_solving, tools,
             overall_fit, summary, degradation)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT (session_id, document_id) DO NOTHING
        "#,
    )
    .bind(session_id)
    .bind(score.document_id)
    .bind(&score.candidate_name)
    .bind(&score.candidate_email)
    .bind(&score.candidate_phone)
    .bind(score.best_distance)
    .bind(i16::from(result.skill_match))
    .bind(i16::from(result.project_relevance))
    .bind(i16::from(result.problem_solving))
    .bind(i16::from(result.tools))
    .bind(i16::from(result.overall_fit))
    .bind(&result.summary)
    .bind(result.degradation.as_str())
    .execute(&mut **tx)
    .await?
    .rows_affected();
    Ok(inserted == 1)
}

/// `processed_count += 1`, completing the session when it reaches `total_count`.
async fn increment_processed(
    tx: &mut Transaction<'_, Postgres>,
    session_id: Uuid,
) -> Result<AnalysisSessionRow, SessionError> {
    Ok(sqlx::query_as::<_, AnalysisSessionRow>(
        r#"
        UPDATE analysis_sessions
        SET processed_count = processed_count + 1,
            status = CASE WHEN processed_count + 1 = total_count THEN 'completed' ELSE status END,
            completed_at = CASE WHEN processed_count + 1 = total_count THEN now() ELSE completed_at END,
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(session_id)
    .fetch_one(&mut **tx)
    .await?)
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create_session(&self, new: NewSession) -> Result<AnalysisSession, SessionError> {
        let mut tx = self.pool.begin().await?;
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO analysis_sessions (id, owner, name, job_description, status)
            VALUES ($1, $2, $3, $4, 'pending')
            "#,
        )
        .bind(id)
        .bind(&new.owner)
        .bind(&new.name)
        .bind(&new.job_description)
        .execute(&mut *tx)
        .await?;

        for target in &new.targets {
            insert_target(&mut tx, id, target).await?;
        }

        let row = sqlx::query_as::<_, AnalysisSessionRow>(
            r#"
            UPDATE analysis_sessions
            SET total_count = (SELECT COUNT(*) FROM session_targets WHERE session_id = $1)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        info!("Created analysis session {id} with {} targets", row.total_count);
        to_session(row)
    }

    async fn get_session(&self, id: Uuid) -> Result<AnalysisSession, SessionError> {
        let row = sqlx::query_as::<_, AnalysisSessionRow>(
            "SELECT * FROM analysis_sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(SessionError::NotFound(id))?;
        to_session(row)
    }

    async fn list_targets(&self, id: Uuid) -> Result<Vec<SessionTarget>, SessionError> {
        self.get_session(id).await?;
        let rows = sqlx::query_as::<_, SessionTargetRow>(
            "SELECT * FROM session_targets WHERE session_id = $1 ORDER BY created_at, document_id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SessionTarget::from).collect())
    }

    async fn add_target(
        &self,
        id: Uuid,
        target: NewTarget,
    ) -> Result<SubmitOutcome, SessionError> {
        let mut tx = self.pool.begin().await?;
        lock_session(&mut tx, id)
            .await?
            .ok_or(SessionError::NotFound(id))?;

        let existing = sqlx::query_as::<_, SessionTargetRow>(
            "SELECT * FROM session_targets WHERE session_id = $1 AND content_hash = $2",
        )
        .bind(id)
        .bind(&target.content_hash)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(existing) = existing {
            let score = sqlx::query_as::<_, ScoreResultRow>(
                "SELECT * FROM score_results WHERE session_id = $1 AND document_id = $2",
            )
            .bind(id)
            .bind(existing.document_id)
            .fetch_optional(&mut *tx)
            .await?;
            tx.commit().await?;
            return Ok(match score {
                Some(row) => SubmitOutcome::AlreadyScored(to_score(row)?),
                None => SubmitOutcome::Queued(existing.into()),
            });
        }

        let inserted = insert_target(&mut tx, id, &target)
            .await?
            .ok_or_else(|| SessionError::Corrupt("target insert conflicted".into()))?;

        sqlx::query(
            r#"
            UPDATE analysis_sessions
            SET total_count = total_count + 1,
                status = CASE WHEN status IN ('completed', 'failed') THEN 'pending' ELSE status END,
                completed_at = CASE WHEN status IN ('completed', 'failed') THEN NULL ELSE completed_at END,
                error = CASE WHEN status IN ('completed', 'failed') THEN NULL ELSE error END,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(SubmitOutcome::Queued(inserted.into()))
    }

    async fn begin_processing(&self, id: Uuid) -> Result<Option<AnalysisSession>, SessionError> {
        let mut tx = self.pool.begin().await?;
        let current = to_session(
            lock_session(&mut tx, id)
                .await?
                .ok_or(SessionError::NotFound(id))?,
        )?;
        if current.status.is_terminal() {
            tx.commit().await?;
            return Ok(None);
        }

        let row = sqlx::query_as::<_, AnalysisSessionRow>(
            r#"
            WITH counts AS (
                SELECT
                    (SELECT COUNT(*) FROM score_results WHERE session_id = $1)::INT AS processed,
                    (SELECT COUNT(*) FROM session_targets WHERE session_id = $1)::INT AS total
            )
            UPDATE analysis_sessions
            SET processed_count = counts.processed,
                total_count = counts.total,
                status = CASE WHEN counts.processed = counts.total THEN 'completed' ELSE 'processing' END,
                completed_at = CASE WHEN counts.processed = counts.total THEN now() ELSE NULL END,
                updated_at = now()
            FROM counts
            WHERE id = $1
            RETURNING analysis_sessions.*
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        to_session(row).map(Some)
    }

    async fn update_session_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        error: Option<String>,
    ) -> Result<AnalysisSession, SessionError> {
        let mut tx = self.pool.begin().await?;
        let current = to_session(
            lock_session(&mut tx, id)
                .await?
                .ok_or(SessionError::NotFound(id))?,
        )?;
        if !current.status.can_transition_to(status) {
            return Err(SessionError::InvalidTransition {
                from: current.status,
                to: status,
            });
        }

        let row = sqlx::query_as::<_, AnalysisSessionRow>(
            r#"
            UPDATE analysis_sessions
            SET status = $2,
                error = $3,
                completed_at = CASE WHEN $2 IN ('completed', 'failed') THEN now() ELSE completed_at END,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        to_session(row)
    }

    async fn record_score(
        &self,
        id: Uuid,
        run_epoch: u32,
        score: NewScore,
    ) -> Result<RecordOutcome, SessionError> {
        let mut tx = self.pool.begin().await?;
        let Some(row) = lock_session(&mut tx, id).await? else {
            return Ok(RecordOutcome::Stale);
        };
        let session = to_session(row)?;
        if session.run_epoch != run_epoch || session.status != SessionStatus::Processing {
            return Ok(RecordOutcome::Stale);
        }

        let is_target: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM session_targets WHERE session_id = $1 AND document_id = $2)",
        )
        .bind(id)
        .bind(score.document_id)
        .fetch_one(&mut *tx)
        .await?;
        if !is_target {
            return Err(SessionError::UnknownTarget {
                session_id: id,
                document_id: score.document_id,
            });
        }

        if !upsert_score_result(&mut tx, id, &score).await? {
            tx.commit().await?;
            return Ok(RecordOutcome::AlreadyScored);
        }

        let updated = to_session(increment_processed(&mut tx, id).await?)?;
        tx.commit().await?;

        Ok(RecordOutcome::Recorded {
            processed_count: updated.processed_count,
            status: updated.status,
        })
    }

    async fn get_score(
        &self,
        id: Uuid,
        document_id: Uuid,
    ) -> Result<Option<ScoreRecord>, SessionError> {
        sqlx::query_as::<_, ScoreResultRow>(
            "SELECT * FROM score_results WHERE session_id = $1 AND document_id = $2",
        )
        .bind(id)
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?
        .map(to_score)
        .transpose()
    }

    async fn list_scores(&self, id: Uuid) -> Result<Vec<ScoreRecord>, SessionError> {
        self.get_session(id).await?;
        sqlx::query_as::<_, ScoreResultRow>(
            "SELECT * FROM score_results WHERE session_id = $1 ORDER BY overall_fit DESC, created_at",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(to_score)
        .collect()
    }

    async fn reset_session(&self, id: Uuid) -> Result<AnalysisSession, SessionError> {
        let mut tx = self.pool.begin().await?;
        lock_session(&mut tx, id)
            .await?
            .ok_or(SessionError::NotFound(id))?;

        sqlx::query("DELETE FROM score_results WHERE session_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, AnalysisSessionRow>(
            r#"
            UPDATE analysis_sessions
            SET status = 'pending',
                processed_count = 0,
                run_epoch = run_epoch + 1,
                error = NULL,
                completed_at = NULL,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        info!("Reset analysis session {id}");
        to_session(row)
    }

    async fn delete_session(&self, id: Uuid) -> Result<(), SessionError> {
        // Targets and results cascade.
        let deleted = sqlx::query("DELETE FROM analysis_sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(SessionError::NotFound(id));
        }
        info!("Deleted analysis session {id}");
        Ok(())
    }
}
