//! Semantic Index: chunked document text with session-scoped similarity search.
//!
//! Chunks carry `{session_id, doc_id, chunk_index}` plus caller metadata.
//! Distances are cosine distances in [0, 2], lower is closer.
//! Carried as `Arc<dyn SemanticIndex>`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use uuid::Uuid;

pub mod chunking;
pub mod embedding;
pub mod memory;
pub mod postgres;

pub use chunking::chunk_words;
pub use embedding::{cosine_distance, embed_one, Embedder, EmbeddingConfig, HttpEmbedder};
pub use memory::MemorySemanticIndex;
pub use postgres::PgSemanticIndex;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Index unavailable: {0}")]
    Unavailable(String),

    #[error("Embedding provider error: {0}")]
    Embedding(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub text: String,
    pub metadata: Value,
    pub distance: f64,
}

#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Chunks and stores `text` for the session. Returns the new document id.
    async fn index(&self, session_id: Uuid, text: &str, metadata: Value)
        -> Result<Uuid, IndexError>;

    /// Up to `k` chunks ordered by ascending distance, optionally scoped to one session.
    async fn search(
        &self,
        query: &str,
        session_id: Option<Uuid>,
        k: usize,
    ) -> Result<Vec<SearchHit>, IndexError>;

    async fn clear(&self, session_id: Uuid) -> Result<(), IndexError>;

    /// Atomically swaps every chunk of the session for chunks of `text`.
    /// A concurrent search sees either the old chunks or the new ones, never a mix.
    async fn replace(
        &self,
        session_id: Uuid,
        text: &str,
        metadata: Value,
    ) -> Result<Uuid, IndexError>;

    async fn chunk_count(&self, session_id: Uuid) -> Result<usize, IndexError>;
}

/// A chunk ready to store: text, embedding and merged metadata.
pub(crate) struct PreparedChunk {
    pub chunk_index: i32,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: Value,
}

/// Chunks `text` and embeds every chunk in one provider call.
pub(crate) async fn prepare_chunks(
    embedder: &dyn Embedder,
    words_per_chunk: usize,
    session_id: Uuid,
    doc_id: Uuid,
    text: &str,
    metadata: &Value,
) -> Result<Vec<PreparedChunk>, IndexError> {
    let chunks = chunk_words(text, words_per_chunk);
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embedder.embed(&texts).await?;
    if embeddings.len() != chunks.len() {
        return Err(IndexError::Embedding(format!(
            "expected {} vectors, got {}",
            chunks.len(),
            embeddings.len()
        )));
    }

    Ok(chunks
        .into_iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| {
            let mut merged = match metadata {
                Value::Object(map) => map.clone(),
                _ => Map::new(),
            };
            merged.insert("session_id".into(), json!(session_id));
            merged.insert("doc_id".into(), json!(doc_id));
            merged.insert("chunk_index".into(), json!(chunk.chunk_index));

            PreparedChunk {
                chunk_index: chunk.chunk_index,
                embedding,
                text: chunk.text,
                metadata: Value::Object(merged),
            }
        })
        .collect())
}
