use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::pipeline::extract::infer_media_type;
use crate::session::models::{AnalysisSession, NewSession, NewTarget, ScoreRecord, SubmitOutcome};
use crate::session::queue::EnqueueOutcome;
use crate::state::AppState;
use crate::storage::{content_hash, resume_key};

/// Multipart field carrying resume files. Other fields are ignored.
const UPLOAD_FIELD: &str = "file";

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    pub owner: String,
    pub name: String,
    pub job_description: String,
}

#[derive(Serialize)]
pub struct SessionDetailResponse {
    #[serde(flatten)]
    pub session: AnalysisSession,
    pub results: Vec<ScoreRecord>,
}

#[derive(Serialize)]
pub struct RunResponse {
    pub session_id: Uuid,
    /// `queued`, or `rerun_scheduled` when a run is already in flight.
    pub queue: &'static str,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub document_id: Uuid,
    pub filename: String,
    pub media_type: String,
    /// `queued` or `already_scored`.
    pub status: &'static str,
    pub result: Option<ScoreRecord>,
}

/// POST /api/v1/sessions
pub async fn handle_create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<AnalysisSession>), AppError> {
    if req.job_description.trim().is_empty() {
        return Err(AppError::Validation(
            "job_description must not be empty".to_string(),
        ));
    }
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("name must not be empty".to_string()));
    }

    let session = state
        .store
        .create_session(NewSession {
            owner: req.owner,
            name: req.name,
            job_description: req.job_description,
            targets: Vec::new(),
        })
        .await?;

    info!("Created analysis session {} ({})", session.id, session.name);
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/v1/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionDetailResponse>, AppError> {
    let session = state.store.get_session(id).await?;
    let results = state.store.list_scores(id).await?;
    Ok(Json(SessionDetailResponse { session, results }))
}

/// GET /api/v1/sessions/:id/results
pub async fn handle_list_results(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ScoreRecord>>, AppError> {
    Ok(Json(state.store.list_scores(id).await?))
}

/// GET /api/v1/sessions/:id/results/:document_id
pub async fn handle_get_result(
    State(state): State<AppState>,
    Path((id, document_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ScoreRecord>, AppError> {
    state
        .store
        .get_score(id, document_id)
        .await?
        .map(Json)
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "No result for document {document_id} in session {id}"
            ))
        })
}

/// POST /api/v1/sessions/:id/run
pub async fn handle_run_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<RunResponse>), AppError> {
    let session = state.store.get_session(id).await?;
    if session.status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "Session {id} is {}; reset it or add documents to run it again",
            session.status
        )));
    }

    let queue = match state.queue.enqueue(id).await? {
        EnqueueOutcome::Queued => "queued",
        EnqueueOutcome::RerunScheduled => "rerun_scheduled",
    };
    info!("Session {id} run requested ({queue})");
    Ok((
        StatusCode::ACCEPTED,
        Json(RunResponse {
            session_id: id,
            queue,
        }),
    ))
}

/// POST /api/v1/sessions/:id/reset
pub async fn handle_reset_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AnalysisSession>, AppError> {
    let session = state.store.reset_session(id).await?;
    state.pipeline.indexes().evict(id);
    info!("Session {id} reset (epoch {})", session.run_epoch);
    Ok(Json(session))
}

/// DELETE /api/v1/sessions/:id
pub async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.store.delete_session(id).await?;
    state.pipeline.indexes().evict(id);
    info!("Session {id} deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/sessions/:id/documents
///
/// Stores every `file` field in object storage and adds it to the session. A
/// file already scored in this session comes back with its existing result.
///
/// The object is written before the target row so a target never points at a
/// missing key. When the store reports the content as an existing document, the
/// fresh object is an orphan and is deleted again.
pub async fn handle_upload_documents(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<Vec<UploadResponse>>, AppError> {
    // Reject unknown sessions before writing anything to storage.
    state.store.get_session(id).await?;

    let mut uploaded = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or("resume").to_string();
        let declared = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Invalid file '{filename}': {e}")))?;
        if data.is_empty() {
            return Err(AppError::Validation(format!("File '{filename}' is empty")));
        }

        let media_type = infer_media_type(declared.as_deref(), &filename, &data);
        let document_id = Uuid::new_v4();
        let storage_key = resume_key(id, document_id, &filename);
        let hash = content_hash(&data);

        state
            .objects
            .put(&storage_key, data, &media_type)
            .await?;
        let uploaded_key = storage_key.clone();

        let outcome = state
            .store
            .add_target(
                id,
                NewTarget {
                    document_id,
                    filename: filename.clone(),
                    media_type: media_type.clone(),
                    storage_key,
                    content_hash: hash,
                },
            )
            .await?;

        let kept_id = match &outcome {
            SubmitOutcome::Queued(target) => target.document_id,
            SubmitOutcome::AlreadyScored(record) => record.document_id,
        };
        if kept_id != document_id {
            info!("Session {id}: '{filename}' duplicates document {kept_id}");
            if let Err(e) = state.objects.delete(&uploaded_key).await {
                warn!("Could not remove duplicate upload {uploaded_key}: {e}");
            }
        }

        uploaded.push(match outcome {
            SubmitOutcome::Queued(target) => UploadResponse {
                document_id: target.document_id,
                filename: target.filename,
                media_type: target.media_type,
                status: "queued",
                result: None,
            },
            SubmitOutcome::AlreadyScored(record) => UploadResponse {
                document_id: record.document_id,
                filename,
                media_type,
                status: "already_scored",
                result: Some(record),
            },
        });
    }

    if uploaded.is_empty() {
        return Err(AppError::Validation(format!(
            "Expected at least one '{UPLOAD_FIELD}' field"
        )));
    }

    // A run in flight may finish before it sees the new targets.
    if state.queue.is_active(id) {
        state.queue.enqueue(id).await?;
    }

    info!("Session {id}: {} document(s) submitted", uploaded.len());
    Ok(Json(uploaded))
}
