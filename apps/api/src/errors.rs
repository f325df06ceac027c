use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::document::ParseError;
use crate::export::ExportError;
use crate::orchestration::OrchestratorError;
use crate::store::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ParseError> for AppError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::UnsupportedFormat(_) => AppError::Validation(e.to_string()),
            ParseError::Io(io) => AppError::Internal(io.into()),
            other => AppError::UnprocessableEntity(other.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::SessionNotFound(_) => AppError::NotFound(e.to_string()),
            StoreError::Database(db) => AppError::Database(db),
            other => AppError::Internal(other.into()),
        }
    }
}

impl From<OrchestratorError> for AppError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::NoSession
            | OrchestratorError::SessionNotFound(_)
            | OrchestratorError::VersionNotFound(_) => AppError::NotFound(e.to_string()),
            OrchestratorError::SessionActive(_) => AppError::Conflict(e.to_string()),
            OrchestratorError::NoDocument(_) => AppError::UnprocessableEntity(e.to_string()),
            OrchestratorError::Parse(parse) => parse.into(),
            OrchestratorError::Store(store) => store.into(),
            OrchestratorError::Index(index) => AppError::Internal(index.into()),
            OrchestratorError::Task(join) => AppError::Internal(join.into()),
        }
    }
}

impl From<ExportError> for AppError {
    fn from(e: ExportError) -> Self {
        match e {
            ExportError::SessionNotFound(_) => AppError::NotFound(e.to_string()),
            ExportError::Store(store) => store.into(),
            ExportError::Upload(msg) => AppError::S3(msg),
            ExportError::Serialize(err) => AppError::Internal(err.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::UnprocessableEntity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNPROCESSABLE_ENTITY",
                msg.clone(),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::S3(msg) => {
                tracing::error!("S3 error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "S3_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_orchestrator_errors_map_to_http_status() {
        let status = |e: OrchestratorError| AppError::from(e).into_response().status();
        assert_eq!(status(OrchestratorError::NoSession), StatusCode::NOT_FOUND);
        assert_eq!(status(OrchestratorError::SessionActive(Uuid::nil())), StatusCode::CONFLICT);
        assert_eq!(
            status(OrchestratorError::Parse(ParseError::UnsupportedFormat("docx".into()))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(OrchestratorError::Parse(ParseError::Empty("a.pdf".into()))),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(OrchestratorError::Store(StoreError::SessionNotFound(Uuid::nil()))),
            StatusCode::NOT_FOUND
        );
    }
}
