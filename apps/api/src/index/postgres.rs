use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    cosine_distance, embed_one, prepare_chunks, Embedder, IndexError, PreparedChunk, SearchHit, SemanticIndex,
};

#[derive(FromRow)]
struct ChunkRow {
    content: String,
    embedding: Vec<f32>,
    metadata: Value,
}

/// Chunks in `document_chunks`, embeddings as `REAL[]`.
///
/// Search loads the session's chunks and ranks them in process. Résumé sessions
/// hold a handful of chunks, so brute force is adequate.
#[derive(Clone)]
pub struct PgSemanticIndex {
    pool: PgPool,
    embedder: Arc<dyn Embedder>,
    words_per_chunk: usize,
}

impl PgSemanticIndex {
    pub fn new(pool: PgPool, embedder: Arc<dyn Embedder>, words_per_chunk: usize) -> Self {
        Self {
            pool,
            embedder,
            words_per_chunk,
        }
    }

    async fn insert_chunks(
        tx: &mut Transaction<'_, Postgres>,
        session_id: Uuid,
        doc_id: Uuid,
        chunks: &[PreparedChunk],
    ) -> Result<(), IndexError> {
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO document_chunks
                    (id, session_id, doc_id, chunk_index, content, embedding, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(session_id)
            .bind(doc_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.embedding)
            .bind(&chunk.metadata)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl SemanticIndex for PgSemanticIndex {
    async fn index(
        &self,
        session_id: Uuid,
        text: &str,
        metadata: Value,
    ) -> Result<Uuid, IndexError> {
        let doc_id = Uuid::new_v4();
        let chunks = prepare_chunks(
            self.embedder.as_ref(),
            self.words_per_chunk,
            session_id,
            doc_id,
            text,
            &metadata,
        )
        .await?;

        let mut tx = self.pool.begin().await?;
        Self::insert_chunks(&mut tx, session_id, doc_id, &chunks).await?;
        tx.commit().await?;

        debug!("Indexed {} chunks for session {session_id}", chunks.len());
        Ok(doc_id)
    }

    async fn search(
        &self,
        query: &str,
        session_id: Option<Uuid>,
        k: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let rows = match session_id {
            Some(id) => {
                sqlx::query_as::<_, ChunkRow>(
                    "SELECT content, embedding, metadata FROM document_chunks WHERE session_id = $1",
                )
                .bind(id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ChunkRow>(
                    "SELECT content, embedding, metadata FROM document_chunks",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        let query_vector = embed_one(self.embedder.as_ref(), query).await?;
        let mut hits: Vec<SearchHit> = rows
            .into_iter()
            .map(|row| SearchHit {
                distance: cosine_distance(&query_vector, &row.embedding),
                text: row.content,
                metadata: row.metadata,
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn clear(&self, session_id: Uuid) -> Result<(), IndexError> {
        let result = sqlx::query("DELETE FROM document_chunks WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        debug!(
            "Cleared {} chunks for session {session_id}",
            result.rows_affected()
        );
        Ok(())
    }

    async fn replace(
        &self,
        session_id: Uuid,
        text: &str,
        metadata: Value,
    ) -> Result<Uuid, IndexError> {
        let doc_id = Uuid::new_v4();
        let chunks = prepare_chunks(
            self.embedder.as_ref(),
            self.words_per_chunk,
            session_id,
            doc_id,
            text,
            &metadata,
        )
        .await?;

        // Delete + insert commit together; readers never see an empty or mixed index.
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM document_chunks WHERE session_id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        Self::insert_chunks(&mut tx, session_id, doc_id, &chunks).await?;
        tx.commit().await?;

        info!(
            "Re-indexed session {session_id}: {} chunks (doc {doc_id})",
            chunks.len()
        );
        Ok(doc_id)
    }

    async fn chunk_count(&self, session_id: Uuid) -> Result<usize, IndexError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks WHERE session_id = $1")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as usize)
    }
}
