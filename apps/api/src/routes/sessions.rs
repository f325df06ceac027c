use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::document::ParsedDocument;
use crate::errors::AppError;
use crate::orchestration::{QueryResult, SessionInfo, SessionStarted};
use crate::routing::SubTask;
use crate::state::AppState;
use crate::store::{DocumentVersion, MessageRecord};

const DEFAULT_TEXT_FILE_NAME: &str = "resume.txt";

#[derive(Deserialize)]
pub struct TextSessionRequest {
    pub text: String,
    pub file_name: Option<String>,
    pub owner_id: Option<String>,
}

#[derive(Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub context: Option<Value>,
}

#[derive(Deserialize)]
pub struct DecomposeRequest {
    pub query: String,
}

#[derive(Deserialize)]
pub struct MessagesQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct ExportResponse {
    pub s3_key: String,
}

fn non_blank(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("'{field}' must not be empty")));
    }
    Ok(())
}

/// POST /api/v1/sessions
/// Multipart upload: `file` (pdf, txt, md) and optional `owner_id`.
pub async fn handle_create_session(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SessionStarted>), AppError> {
    let mut upload: Option<(String, Bytes)> = None;
    let mut owner_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(e.to_string()))?;
                upload = Some((file_name, data));
            }
            "owner_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(e.to_string()))?;
                owner_id = Some(text).filter(|t| !t.trim().is_empty());
            }
            _ => {}
        }
    }

    let (file_name, data) =
        upload.ok_or_else(|| AppError::Validation("Missing 'file' field".to_string()))?;
    non_blank(&file_name, "file name")?;

    let document = state.documents.parse(&file_name, data).await?;
    let started = state.sessions.start(document, owner_id.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(started)))
}

/// POST /api/v1/sessions/text
pub async fn handle_create_text_session(
    State(state): State<AppState>,
    Json(req): Json<TextSessionRequest>,
) -> Result<(StatusCode, Json<SessionStarted>), AppError> {
    let file_name = req.file_name.as_deref().unwrap_or(DEFAULT_TEXT_FILE_NAME);
    let document = ParsedDocument::from_text(file_name, &req.text)?;
    let started = state.sessions.start(document, req.owner_id.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(started)))
}

/// GET /api/v1/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionInfo>, AppError> {
    let orchestrator = state.sessions.get(id).await?;
    Ok(Json(orchestrator.session_info().await?))
}

/// DELETE /api/v1/sessions/:id
pub async fn handle_end_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.sessions.end(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/sessions/:id/query
pub async fn handle_query(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResult>, AppError> {
    non_blank(&req.query, "query")?;
    let result = state
        .sessions
        .query(id, req.query.trim().to_string(), req.context)
        .await?;
    Ok(Json(result))
}

/// POST /api/v1/sessions/:id/decompose
pub async fn handle_decompose(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<DecomposeRequest>,
) -> Result<Json<Vec<SubTask>>, AppError> {
    non_blank(&req.query, "query")?;
    let orchestrator = state.sessions.get(id).await?;
    Ok(Json(orchestrator.decompose(req.query.trim()).await))
}

/// GET /api/v1/sessions/:id/messages?limit=
pub async fn handle_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<MessagesQuery>,
) -> Result<Json<Vec<MessageRecord>>, AppError> {
    let orchestrator = state.sessions.get(id).await?;
    Ok(Json(orchestrator.messages(params.limit).await?))
}

/// GET /api/v1/sessions/:id/versions
pub async fn handle_versions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DocumentVersion>>, AppError> {
    let orchestrator = state.sessions.get(id).await?;
    Ok(Json(orchestrator.versions().await?))
}

/// POST /api/v1/sessions/:id/versions/:version_id/revert
pub async fn handle_revert(
    State(state): State<AppState>,
    Path((id, version_id)): Path<(Uuid, Uuid)>,
) -> Result<(StatusCode, Json<DocumentVersion>), AppError> {
    let version = state.sessions.revert(id, version_id).await?;
    Ok((StatusCode::CREATED, Json(version)))
}

/// POST /api/v1/sessions/:id/export
pub async fn handle_export(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ExportResponse>, AppError> {
    let store = state.sessions.services().store.clone();
    let s3_key = state.exporter.export(store.as_ref(), id).await?;
    Ok(Json(ExportResponse { s3_key }))
}
