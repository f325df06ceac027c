//! Session export: a JSON snapshot of a session's full history, uploaded to S3.
//!
//! S3 key format: `sessions/{session_id}/export-{timestamp}.json`

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::store::{DocumentVersion, MessageRecord, SessionRecord, SessionStore, StoreError};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Session {0} not found")]
    SessionNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("S3 upload failed: {0}")]
    Upload(String),
}

#[derive(Debug, Serialize)]
pub struct SessionExport {
    pub session: SessionRecord,
    pub exported_at: DateTime<Utc>,
    pub messages: Vec<MessageRecord>,
    pub versions: Vec<DocumentVersion>,
}

pub async fn build_export(
    store: &dyn SessionStore,
    session_id: Uuid,
) -> Result<SessionExport, ExportError> {
    let session = store
        .get_session(session_id)
        .await?
        .ok_or(ExportError::SessionNotFound(session_id))?;

    Ok(SessionExport {
        session,
        exported_at: Utc::now(),
        messages: store.get_messages(session_id, None).await?,
        versions: store.get_versions(session_id).await?,
    })
}

pub fn export_key(session_id: Uuid, at: DateTime<Utc>) -> String {
    format!(
        "sessions/{session_id}/export-{}.json",
        at.format("%Y%m%dT%H%M%SZ")
    )
}

pub struct SessionExporter {
    s3: S3Client,
    bucket: String,
}

impl SessionExporter {
    pub fn new(s3: S3Client, bucket: String) -> Self {
        Self { s3, bucket }
    }

    /// Builds the export and uploads it. Returns the S3 key.
    pub async fn export(
        &self,
        store: &dyn SessionStore,
        session_id: Uuid,
    ) -> Result<String, ExportError> {
        let export = build_export(store, session_id).await?;
        let key = export_key(session_id, export.exported_at);
        let body = serde_json::to_vec_pretty(&export)?;

        self.s3
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| ExportError::Upload(e.to_string()))?;

        info!(
            "Exported session {session_id} ({} messages, {} versions) to s3://{}/{key}",
            export.messages.len(),
            export.versions.len(),
            self.bucket
        );
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemorySessionStore, Role};
    use chrono::TimeZone;

    #[test]
    fn test_export_key_layout() {
        let id = Uuid::nil();
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        assert_eq!(
            export_key(id, at),
            "sessions/00000000-0000-0000-0000-000000000000/export-20260314T092653Z.json"
        );
    }

    #[tokio::test]
    async fn test_build_export_collects_history() {
        let store = MemorySessionStore::new();
        let session_id = store.create_session(Some("owner")).await.unwrap();
        store
            .append_version(session_id, "SKILLS\nRust", "Original", None)
            .await
            .unwrap();
        store
            .append_message(session_id, Role::User, "Enhance skills", None)
            .await
            .unwrap();

        let export = build_export(&store, session_id).await.unwrap();
        assert_eq!(export.session.owner_id.as_deref(), Some("owner"));
        assert_eq!(export.messages.len(), 1);
        assert_eq!(export.versions[0].label, "Original");

        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn test_build_export_unknown_session() {
        let store = MemorySessionStore::new();
        let result = build_export(&store, Uuid::new_v4()).await;
        assert!(matches!(result, Err(ExportError::SessionNotFound(_))));
    }
}
