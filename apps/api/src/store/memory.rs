use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DocumentVersion, MessageRecord, Role, SessionRecord, SessionStore, StoreError};

struct SessionLog {
    record: SessionRecord,
    messages: Vec<MessageRecord>,
    versions: Vec<DocumentVersion>,
}

/// In-process store with the same append-only contract as `PgSessionStore`.
/// Used for tests and `STORAGE_BACKEND=memory`.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Uuid, SessionLog>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, owner_id: Option<&str>) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let record = SessionRecord {
            id,
            owner_id: owner_id.map(str::to_string),
            created_at: Utc::now(),
        };
        self.sessions.write().await.insert(
            id,
            SessionLog {
                record,
                messages: Vec::new(),
                versions: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(&session_id)
            .map(|log| log.record.clone()))
    }

    async fn append_message(
        &self,
        session_id: Uuid,
        role: Role,
        content: &str,
        metadata: Option<Value>,
    ) -> Result<Uuid, StoreError> {
        let mut sessions = self.sessions.write().await;
        let log = sessions
            .get_mut(&session_id)
            .ok_or(StoreError::SessionNotFound(session_id))?;
        let id = Uuid::new_v4();
        log.messages.push(MessageRecord {
            id,
            session_id,
            role,
            content: content.to_string(),
            metadata,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn get_messages(
        &self,
        session_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let sessions = self.sessions.read().await;
        let Some(log) = sessions.get(&session_id) else {
            return Ok(Vec::new());
        };
        let skip = limit
            .map(|l| log.messages.len().saturating_sub(l))
            .unwrap_or(0);
        Ok(log.messages[skip..].to_vec())
    }

    async fn append_version(
        &self,
        session_id: Uuid,
        content: &str,
        label: &str,
        metadata: Option<Value>,
    ) -> Result<DocumentVersion, StoreError> {
        let mut sessions = self.sessions.write().await;
        let log = sessions
            .get_mut(&session_id)
            .ok_or(StoreError::SessionNotFound(session_id))?;
        let seq = log.versions.last().map(|v| v.seq).unwrap_or(0) + 1;
        let version = DocumentVersion {
            id: Uuid::new_v4(),
            session_id,
            seq,
            content: content.to_string(),
            label: label.to_string(),
            metadata,
            created_at: Utc::now(),
        };
        log.versions.push(version.clone());
        Ok(version)
    }

    async fn get_versions(&self, session_id: Uuid) -> Result<Vec<DocumentVersion>, StoreError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(&session_id)
            .map(|log| log.versions.clone())
            .unwrap_or_default())
    }

    async fn get_latest_version(
        &self,
        session_id: Uuid,
    ) -> Result<Option<DocumentVersion>, StoreError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(&session_id)
            .and_then(|log| log.versions.last().cloned()))
    }

    async fn get_version_by_id(
        &self,
        version_id: Uuid,
    ) -> Result<Option<DocumentVersion>, StoreError> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .flat_map(|log| log.versions.iter())
            .find(|v| v.id == version_id)
            .cloned())
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .remove(&session_id)
            .map(|_| ())
            .ok_or(StoreError::SessionNotFound(session_id))
    }
}
