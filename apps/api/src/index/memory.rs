//! In-memory semantic index with brute-force cosine search.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{
    cosine_distance, embed_one, prepare_chunks, Embedder, IndexError, PreparedChunk, SearchHit, SemanticIndex,
};

struct StoredChunk {
    session_id: Uuid,
    chunk: PreparedChunk,
}

pub struct MemorySemanticIndex {
    chunks: RwLock<Vec<StoredChunk>>,
    embedder: Arc<dyn Embedder>,
    words_per_chunk: usize,
}

impl MemorySemanticIndex {
    pub fn new(embedder: Arc<dyn Embedder>, words_per_chunk: usize) -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
            embedder,
            words_per_chunk,
        }
    }

    async fn prepare(
        &self,
        session_id: Uuid,
        doc_id: Uuid,
        text: &str,
        metadata: &Value,
    ) -> Result<Vec<StoredChunk>, IndexError> {
        let chunks = prepare_chunks(
            self.embedder.as_ref(),
            self.words_per_chunk,
            session_id,
            doc_id,
            text,
            metadata,
        )
        .await?;
        Ok(chunks
            .into_iter()
            .map(|chunk| StoredChunk { session_id, chunk })
            .collect())
    }
}

#[async_trait]
impl SemanticIndex for MemorySemanticIndex {
    async fn index(
        &self,
        session_id: Uuid,
        text: &str,
        metadata: Value,
    ) -> Result<Uuid, IndexError> {
        let doc_id = Uuid::new_v4();
        let prepared = self.prepare(session_id, doc_id, text, &metadata).await?;
        debug!("Indexing {} chunks for session {session_id}", prepared.len());
        self.chunks.write().await.extend(prepared);
        Ok(doc_id)
    }

    async fn search(
        &self,
        query: &str,
        session_id: Option<Uuid>,
        k: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let query_vector = embed_one(self.embedder.as_ref(), query).await?;
        let chunks = self.chunks.read().await;

        let mut hits: Vec<SearchHit> = chunks
            .iter()
            .filter(|c| session_id.map_or(true, |id| c.session_id == id))
            .map(|c| SearchHit {
                text: c.chunk.text.clone(),
                metadata: c.chunk.metadata.clone(),
                distance: cosine_distance(&query_vector, &c.chunk.embedding),
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
        self.chunks
            .write()
            .await
            .retain(|c| c.session_id != session_id);
        Ok(())
    }

    async fn replace(
        &self,
        session_id: Uuid,
        text: &str,
        metadata: Value,
    ) -> Result<Uuid, IndexError> {
        let doc_id = Uuid::new_v4();
        let prepared = self.prepare(session_id, doc_id, text, &metadata).await?;

        // Embedding happens before the guard; one write guard covers both steps.
        let mut chunks = self.chunks.write().await;
        chunks.retain(|c| c.session_id != session_id);
        chunks.extend(prepared);
        Ok(doc_id)
    }

    async fn chunk_count(&self, session_id: Uuid) -> Result<usize, IndexError> {
        Ok(self
            .chunks
            .read()
            .await
            .iter()
            .filter(|c| c.session_id == session_id)
            .count())
    }
}
