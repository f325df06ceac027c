use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use super::{DocumentVersion, MessageRecord, Role, SessionRecord, SessionStore, StoreError};

const VERSION_COLUMNS: &str = "id, session_id, seq, content, label, metadata, created_at";

#[derive(FromRow)]
struct MessageRow {
    id: Uuid,
    session_id: Uuid,
    role: String,
    content: String,
    metadata: Option<Value>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for MessageRecord {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(MessageRecord {
            id: row.id,
            session_id: row.session_id,
            role: row.role.parse()?,
            content: row.content,
            metadata: row.metadata,
            created_at: row.created_at,
        })
    }
}

/// Postgres-backed store. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Maps an FK violation on `session_id` to `SessionNotFound`.
fn missing_session(session_id: Uuid) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| {
        if let sqlx::Error::Database(db) = &e {
            if db.is_foreign_key_violation() {
                return StoreError::SessionNotFound(session_id);
            }
        }
        StoreError::Database(e)
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create_session(&self, owner_id: Option<&str>) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO sessions (id, owner_id) VALUES ($1, $2)")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        info!("Created session {id}");
        Ok(id)
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<SessionRecord>, StoreError> {
        Ok(sqlx::query_as::<_, SessionRecord>(
            "SELECT id, owner_id, created_at FROM sessions WHERE id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn append_message(
        &self,
        session_id: Uuid,
        role: Role,
        content: &str,
        metadata: Option<Value>,
    ) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO session_messages (id, session_id, role, content, metadata)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(session_id)
        .bind(role.as_str())
        .bind(content)
        .bind(metadata)
        .execute(&self.pool)
        .await
        .map_err(missing_session(session_id))?;
        debug!("Appended {} message to session {session_id}", role.as_str());
        Ok(id)
    }

    async fn get_messages(
        &self,
        session_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        // LIMIT NULL returns every row
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, session_id, role, content, metadata, created_at
            FROM (
                SELECT * FROM session_messages
                WHERE session_id = $1
                ORDER BY position DESC
                LIMIT $2
            ) recent
            ORDER BY position ASC
            "#,
        )
        .bind(session_id)
        .bind(limit.map(|l| l as i64))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MessageRecord::try_from).collect()
    }

    async fn append_version(
        &self,
        session_id: Uuid,
        content: &str,
        label: &str,
        metadata: Option<Value>,
    ) -> Result<DocumentVersion, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Row lock on the session serialises seq allocation per session.
        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM sessions WHERE id = $1 FOR UPDATE")
                .bind(session_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(StoreError::SessionNotFound(session_id));
        }

        let current_max: Option<i32> =
            sqlx::query_scalar("SELECT MAX(seq) FROM document_versions WHERE session_id = $1")
                .bind(session_id)
                .fetch_one(&mut *tx)
                .await?;
        let seq = current_max.unwrap_or(0) + 1;

        // Append-only INSERT
        let version = sqlx::query_as::<_, DocumentVersion>(&format!(
            r#"
            INSERT INTO document_versions (id, session_id, seq, content, label, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {VERSION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(seq)
        .bind(content)
        .bind(label)
        .bind(metadata)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            "Inserted version {} (seq {seq}, '{label}') for session {session_id}",
            version.id
        );
        Ok(version)
    }

    async fn get_versions(&self, session_id: Uuid) -> Result<Vec<DocumentVersion>, StoreError> {
        Ok(sqlx::query_as::<_, DocumentVersion>(&format!(
            "SELECT {VERSION_COLUMNS} FROM document_versions WHERE session_id = $1 ORDER BY seq ASC"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_latest_version(
        &self,
        session_id: Uuid,
    ) -> Result<Option<DocumentVersion>, StoreError> {
        Ok(sqlx::query_as::<_, DocumentVersion>(&format!(
            "SELECT {VERSION_COLUMNS} FROM document_versions WHERE session_id = $1 ORDER BY seq DESC LIMIT 1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn get_version_by_id(
        &self,
        version_id: Uuid,
    ) -> Result<Option<DocumentVersion>, StoreError> {
        Ok(sqlx::query_as::<_, DocumentVersion>(&format!(
            "SELECT {VERSION_COLUMNS} FROM document_versions WHERE id = $1"
        ))
        .bind(version_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<(), StoreError> {
        // Messages and versions go with it (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::SessionNotFound(session_id));
        }
        info!("Deleted session {session_id}");
        Ok(())
    }
}
