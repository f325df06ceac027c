//! In-crate test doubles for the LLM, embedding, index and handler seams.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::handlers::{HandlerError, HandlerTask, MatchAnalyzer, TaskHandler};
use crate::index::{Embedder, IndexError, SearchHit, SemanticIndex};
use crate::llm_client::{Completion, LlmError};

/// Replays canned responses in order, repeating the last one once exhausted.
pub struct ScriptedCompletion {
    responses: Vec<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: responses.into_iter().map(str::to_string).collect(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Completion for ScriptedCompletion {
    async fn complete(&self, prompt: &str, _system: &str) -> Result<String, LlmError> {
        let mut prompts = self.prompts.lock().unwrap();
        let turn = prompts.len();
        prompts.push(prompt.to_string());

        self.responses
            .get(turn)
            .or_else(|| self.responses.last())
            .cloned()
            .ok_or(LlmError::EmptyContent)
    }
}

pub struct FailingCompletion;

#[async_trait]
impl Completion for FailingCompletion {
    async fn complete(&self, _prompt: &str, _system: &str) -> Result<String, LlmError> {
        Err(LlmError::Api {
            status: 503,
            message: "service unavailable".to_string(),
        })
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Feature-hashed bag of words. Deterministic and offline; shared words are
/// the only notion of similarity it has.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = token
                .to_lowercase()
                .bytes()
                .fold(FNV_OFFSET, |h, b| (h ^ b as u64).wrapping_mul(FNV_PRIME));
            let bucket = (hash % self.dimensions as u64) as usize;
            vector[bucket] += if hash >> 63 == 0 { 1.0 } else { -1.0 };
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Returns the same hits for every search, or fails every call.
pub struct FixedIndex {
    hits: Vec<SearchHit>,
    failure: Option<String>,
}

impl FixedIndex {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            failure: None,
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            hits: Vec::new(),
            failure: Some(reason.to_string()),
        }
    }

    fn check(&self) -> Result<(), IndexError> {
        match &self.failure {
            Some(reason) => Err(IndexError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SemanticIndex for FixedIndex {
    async fn index(&self, _session_id: Uuid, _text: &str, _metadata: Value) -> Result<Uuid, IndexError> {
        self.check()?;
        Ok(Uuid::new_v4())
    }

    async fn search(
        &self,
        _query: &str,
        _session_id: Option<Uuid>,
        k: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        self.check()?;
        Ok(self.hits.iter().take(k).cloned().collect())
    }

    async fn clear(&self, _session_id: Uuid) -> Result<(), IndexError> {
        self.check()
    }

    async fn replace(&self, _session_id: Uuid, _text: &str, _metadata: Value) -> Result<Uuid, IndexError> {
        self.check()?;
        Ok(Uuid::new_v4())
    }

    async fn chunk_count(&self, _session_id: Uuid) -> Result<usize, IndexError> {
        self.check()?;
        Ok(self.hits.len())
    }
}

/// Delegates to another index, sleeping before every `replace`.
pub struct SlowIndex {
    inner: Arc<dyn SemanticIndex>,
    delay: Duration,
}

impl SlowIndex {
    pub fn new(inner: Arc<dyn SemanticIndex>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl SemanticIndex for SlowIndex {
    async fn index(&self, session_id: Uuid, text: &str, metadata: Value) -> Result<Uuid, IndexError> {
        self.inner.index(session_id, text, metadata).await
    }

    async fn search(
        &self,
        query: &str,
        session_id: Option<Uuid>,
        k: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        self.inner.search(query, session_id, k).await
    }

    async fn clear(&self, session_id: Uuid) -> Result<(), IndexError> {
        self.inner.clear(session_id).await
    }

    async fn replace(&self, session_id: Uuid, text: &str, metadata: Value) -> Result<Uuid, IndexError> {
        tokio::time::sleep(self.delay).await;
        self.inner.replace(session_id, text, metadata).await
    }

    async fn chunk_count(&self, session_id: Uuid) -> Result<usize, IndexError> {
        self.inner.chunk_count(session_id).await
    }
}

/// Handler that returns fixed outputs in order (repeating the last) and
/// records the primary text of each call.
pub struct StaticHandler {
    outputs: Vec<Result<String, String>>,
    seen: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl StaticHandler {
    pub fn new(output: &str) -> Self {
        Self::sequence(vec![Ok(output)])
    }

    pub fn failing(reason: &str) -> Self {
        Self::sequence(vec![Err(reason)])
    }

    pub fn sequence(outputs: Vec<Result<&str, &str>>) -> Self {
        Self {
            outputs: outputs
                .into_iter()
                .map(|o| o.map(str::to_string).map_err(str::to_string))
                .collect(),
            seen: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleeps for `delay` before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn primary_texts(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskHandler for StaticHandler {
    async fn run(&self, task: &HandlerTask<'_>) -> Result<String, HandlerError> {
        let turn = {
            let mut seen = self.seen.lock().unwrap();
            seen.push(task.primary_text.to_string());
            seen.len() - 1
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.outputs.get(turn).or_else(|| self.outputs.last()) {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(reason)) => Err(HandlerError::Failed(reason.clone())),
            None => Err(HandlerError::Failed("no output scripted".to_string())),
        }
    }
}

pub struct StaticAnalyzer(pub &'static str);

#[async_trait]
impl MatchAnalyzer for StaticAnalyzer {
    async fn analyze(&self, _document: &str, _job_description: &str) -> Result<String, HandlerError> {
        Ok(self.0.to_string())
    }
}

/// Counts calls without doing anything useful; for asserting a handler was skipped.
#[derive(Default)]
pub struct CountingAnalyzer {
    pub calls: AtomicUsize,
}

#[async_trait]
impl MatchAnalyzer for CountingAnalyzer {
    async fn analyze(&self, _document: &str, _job_description: &str) -> Result<String, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("Score: 50/100".to_string())
    }
}
