//! Session Store: durable, append-only log of messages and document versions.
//!
//! No business logic lives here. `PgSessionStore` is the production backend;
//! `MemorySessionStore` honours the same contract for tests and local runs.
//! Carried as `Arc<dyn SessionStore>`.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemorySessionStore;
pub use postgres::PgSessionStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session {0} not found")]
    SessionNotFound(Uuid),

    #[error("Invalid stored value: {0}")]
    InvalidRow(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl FromStr for Role {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(StoreError::InvalidRow(format!("unknown role '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionRecord {
    pub id: Uuid,
    pub owner_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: Role,
    pub content: String,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// One immutable snapshot of the document. `seq` starts at 1 and is dense per session;
/// the highest `seq` is the current document.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DocumentVersion {
    pub id: Uuid,
    pub session_id: Uuid,
    pub seq: i32,
    pub content: String,
    pub label: String,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Append-only persistence contract. Nothing here ever updates a row;
/// `delete_session` is the only removal and takes the whole session with it.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, owner_id: Option<&str>) -> Result<Uuid, StoreError>;

    async fn get_session(&self, session_id: Uuid) -> Result<Option<SessionRecord>, StoreError>;

    async fn append_message(
        &self,
        session_id: Uuid,
        role: Role,
        content: &str,
        metadata: Option<Value>,
    ) -> Result<Uuid, StoreError>;

    /// Messages in chronological order. With a limit, only the most recent `limit`.
    async fn get_messages(
        &self,
        session_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<MessageRecord>, StoreError>;

    async fn append_version(
        &self,
        session_id: Uuid,
        content: &str,
        label: &str,
        metadata: Option<Value>,
    ) -> Result<DocumentVersion, StoreError>;

    /// All versions ordered by `seq`.
    async fn get_versions(&self, session_id: Uuid) -> Result<Vec<DocumentVersion>, StoreError>;

    async fn get_latest_version(
        &self,
        session_id: Uuid,
    ) -> Result<Option<DocumentVersion>, StoreError>;

    async fn get_version_by_id(&self, version_id: Uuid)
        -> Result<Option<DocumentVersion>, StoreError>;

    async fn delete_session(&self, session_id: Uuid) -> Result<(), StoreError>;
}
