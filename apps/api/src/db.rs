use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Schema statements, executed one at a time (Postgres prepared statements
/// cannot hold more than one command).
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS analysis_sessions (
        id              UUID PRIMARY KEY,
        owner           TEXT NOT NULL,
        name            TEXT NOT NULL,
        job_description TEXT NOT NULL,
        status          TEXT NOT NULL DEFAULT 'pending'
                        CHECK (status IN ('pending', 'processing', 'completed', 'failed')),
        processed_count INT NOT NULL DEFAULT 0 CHECK (processed_count >= 0),
        total_count     INT NOT NULL DEFAULT 0 CHECK (total_count >= 0),
        run_epoch       INT NOT NULL DEFAULT 0,
        error           TEXT,
        created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
        completed_at    TIMESTAMPTZ,
        CHECK (processed_count <= total_count)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS session_targets (
        document_id  UUID PRIMARY KEY,
        session_id   UUID NOT NULL REFERENCES analysis_sessions (id) ON DELETE CASCADE,
        filename     TEXT NOT NULL,
        media_type   TEXT NOT NULL,
        storage_key  TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (session_id, content_hash)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS score_results (
        session_id        UUID NOT NULL REFERENCES analysis_sessions (id) ON DELETE CASCADE,
        document_id       UUID NOT NULL REFERENCES session_targets (document_id) ON DELETE CASCADE,
        candidate_name    TEXT NOT NULL,
        candidate_email   TEXT,
        candidate_phone   TEXT,
        best_distance     REAL,
        skill_match       SMALLINT NOT NULL CHECK (skill_match BETWEEN 0 AND 100),
        project_relevance SMALLINT NOT NULL CHECK (project_relevance BETWEEN 0 AND 100),
        problem_solving   SMALLINT NOT NULL CHECK (problem_solving BETWEEN 0 AND 100),
        tools             SMALLINT NOT NULL CHECK (tools BETWEEN 0 AND 100),
        overall_fit       SMALLINT NOT NULL CHECK (overall_fit BETWEEN 0 AND 100),
        summary           TEXT NOT NULL,
        degradation       TEXT NOT NULL DEFAULT 'none',
        created_at        TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (session_id, document_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS score_results_fit_idx ON score_results (session_id, overall_fit DESC)",
];

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Creates the session tables if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("Failed to apply session schema")?;
    }
    info!("Session schema ready");
    Ok(())
}
