//! Orchestrator: owns one active session and runs the query pipeline:
//! classify → retrieve → dispatch (with at most one full-document retry) →
//! persist version → re-index → persist reply.
//!
//! All per-session state sits behind one async mutex, so queries against a
//! session are serialized and the "processing" state is exactly "lock held".

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::dispatch::{DispatchRequest, Dispatcher};
use super::outcome::{HandlerFailure, HandlerOutcome, QueryResult, QueryStatus, RoutingInfo};
use super::section_match::SectionResolver;
use crate::document::{DocumentSource, ParseError, ParsedDocument, Sections};
use crate::handlers::{ConversationTurn, HandlerSet};
use crate::index::{IndexError, SemanticIndex};
use crate::llm_client::Completion;
use crate::retrieval::ContextRetriever;
use crate::routing::{IntentClassifier, SubTask};
use crate::splitter::NarrationSplitter;
use crate::store::{DocumentVersion, MessageRecord, Role, SessionStore, StoreError};

pub const ORIGINAL_LABEL: &str = "Original";
const UPDATED_LABEL: &str = "Updated";
const SESSION_READY_MESSAGE: &str = "Resume loaded successfully. How can I help you optimize it?";

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("No active session. Please upload a resume first.")]
    NoSession,

    #[error("Session {0} is already active on this orchestrator")]
    SessionActive(Uuid),

    #[error("Session {0} not found")]
    SessionNotFound(Uuid),

    #[error("Version {0} not found in the active session")]
    VersionNotFound(Uuid),

    #[error("Session {0} has no document versions")]
    NoDocument(Uuid),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Tunables for retrieval and the dispatch policies.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Retrieved context is used only when the best match is strictly closer than this.
    pub distance_threshold: f64,
    pub top_k: usize,
    /// Job-match queries longer than this are taken as the job description.
    pub job_description_min_chars: usize,
    /// Minimum document fragment length for whole-document tasks on retrieved context.
    pub full_document_floor: usize,
    /// Minimum fragment length for a single rewritten section on retrieved context.
    pub section_floor: usize,
    /// Conversation turns shown to the general Q&A handler and the classifier.
    pub history_turns: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            distance_threshold: 0.8,
            top_k: 3,
            job_description_min_chars: 300,
            full_document_floor: 200,
            section_floor: 50,
            history_turns: 5,
        }
    }
}

/// Collaborators shared by every orchestrator in the process. Built once at startup.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn SessionStore>,
    pub index: Arc<dyn SemanticIndex>,
    pub classifier: IntentClassifier,
    pub retriever: ContextRetriever,
    pub dispatcher: Arc<Dispatcher>,
    pub settings: OrchestratorSettings,
}

impl Services {
    /// LLM-backed handlers for every agent type.
    pub fn build(
        llm: Arc<dyn Completion>,
        store: Arc<dyn SessionStore>,
        index: Arc<dyn SemanticIndex>,
        settings: OrchestratorSettings,
    ) -> Self {
        let handlers = HandlerSet::llm(llm.clone());
        Self::with_handlers(llm, handlers, store, index, settings)
    }

    pub fn with_handlers(
        llm: Arc<dyn Completion>,
        handlers: HandlerSet,
        store: Arc<dyn SessionStore>,
        index: Arc<dyn SemanticIndex>,
        settings: OrchestratorSettings,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            handlers,
            NarrationSplitter::new(llm.clone()),
            SectionResolver::standard(llm.clone()),
            settings.clone(),
        );
        Self {
            retriever: ContextRetriever::new(index.clone(), settings.distance_threshold, settings.top_k),
            classifier: IntentClassifier::new(llm),
            dispatcher: Arc::new(dispatcher),
            store,
            index,
            settings,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    NoSession,
    SessionActiveIdle,
    Processing,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub file_name: String,
    pub word_count: usize,
    pub sections: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStarted {
    pub session_id: Uuid,
    pub version_id: Uuid,
    pub document: DocumentSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: Uuid,
    /// Observed before the session lock is taken; `processing` while a query runs.
    pub state: OrchestratorState,
    pub owner_id: Option<String>,
    pub version_count: usize,
    pub message_count: usize,
    pub current_version: Option<DocumentVersion>,
    pub document: DocumentSummary,
}

struct ActiveSession {
    session_id: Uuid,
    file_name: String,
    conversation: Vec<ConversationTurn>,
}

pub struct Orchestrator {
    services: Services,
    inner: Mutex<Option<ActiveSession>>,
}

impl Orchestrator {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            inner: Mutex::new(None),
        }
    }

    pub fn state(&self) -> OrchestratorState {
        match self.inner.try_lock() {
            Err(_) => OrchestratorState::Processing,
            Ok(guard) if guard.is_some() => OrchestratorState::SessionActiveIdle,
            Ok(_) => OrchestratorState::NoSession,
        }
    }

    pub async fn session_id(&self) -> Option<Uuid> {
        self.inner.lock().await.as_ref().map(|a| a.session_id)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Session lifecycle
    // ────────────────────────────────────────────────────────────────────────

    pub async fn start_session(
        &self,
        source: &dyn DocumentSource,
        file_name: &str,
        data: Bytes,
        owner_id: Option<&str>,
    ) -> Result<SessionStarted, OrchestratorError> {
        let document = source.parse(file_name, data).await?;
        self.start_with_document(document, owner_id).await
    }

    /// Creates the session, stores the document as version "Original" and indexes it.
    /// On failure the orchestrator stays in `NoSession`.
    pub async fn start_with_document(
        &self,
        document: ParsedDocument,
        owner_id: Option<&str>,
    ) -> Result<SessionStarted, OrchestratorError> {
        let mut inner = self.inner.lock().await;
        if let Some(active) = inner.as_ref() {
            return Err(OrchestratorError::SessionActive(active.session_id));
        }

        let store = &self.services.store;
        let session_id = store.create_session(owner_id).await?;

        let version = match store
            .append_version(
                session_id,
                &document.text,
                ORIGINAL_LABEL,
                Some(json!({ "file_name": document.file_name })),
            )
            .await
        {
            Ok(version) => version,
            Err(e) => {
                // Leave no half-created session behind
                if let Err(cleanup) = store.delete_session(session_id).await {
                    warn!("Failed to remove session {session_id} after start failure: {cleanup}");
                }
                return Err(e.into());
            }
        };

        if let Err(e) = self
            .services
            .index
            .index(
                session_id,
                &document.text,
                json!({ "version_id": version.id, "version_label": ORIGINAL_LABEL }),
            )
            .await
        {
            warn!("Indexing failed for new session {session_id}, retrieval will fall back to the full document: {e}");
        }

        store
            .append_message(
                session_id,
                Role::System,
                SESSION_READY_MESSAGE,
                Some(json!({ "file_name": document.file_name })),
            )
            .await?;

        info!(
            "Started session {session_id} for {} ({} words)",
            document.file_name, document.word_count
        );

        *inner = Some(ActiveSession {
            session_id,
            file_name: document.file_name.clone(),
            conversation: Vec::new(),
        });

        Ok(SessionStarted {
            session_id,
            version_id: version.id,
            document: DocumentSummary {
                file_name: document.file_name,
                word_count: document.word_count,
                sections: document.sections.headers(),
            },
        })
    }

    /// Re-activates a stored session, rebuilding the conversation buffer from
    /// its user and assistant messages.
    pub async fn attach_session(&self, session_id: Uuid) -> Result<(), OrchestratorError> {
        let mut inner = self.inner.lock().await;
        if let Some(active) = inner.as_ref() {
            if active.session_id == session_id {
                return Ok(());
            }
            return Err(OrchestratorError::SessionActive(active.session_id));
        }

        let store = &self.services.store;
        store
            .get_session(session_id)
            .await?
            .ok_or(OrchestratorError::SessionNotFound(session_id))?;

        let versions = store.get_versions(session_id).await?;
        let latest = versions
            .last()
            .ok_or(OrchestratorError::NoDocument(session_id))?;
        let file_name = versions
            .first()
            .and_then(|v| v.metadata.as_ref())
            .and_then(|m| m.get("file_name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let conversation = store
            .get_messages(session_id, None)
            .await?
            .into_iter()
            .filter(|m| m.role != Role::System)
            .map(|m| ConversationTurn {
                role: m.role,
                content: m.content,
            })
            .collect::<Vec<_>>();

        // The in-memory index does not survive a restart
        if self.services.index.chunk_count(session_id).await.unwrap_or(0) == 0 {
            self.reindex(session_id, latest).await;
        }

        info!(
            "Attached session {session_id} ({} versions, {} turns)",
            versions.len(),
            conversation.len()
        );
        *inner = Some(ActiveSession {
            session_id,
            file_name,
            conversation,
        });
        Ok(())
    }

    /// Deletes the session and its chunks and returns to `NoSession`.
    pub async fn end_session(&self) -> Result<Uuid, OrchestratorError> {
        let mut inner = self.inner.lock().await;
        let session_id = inner
            .as_ref()
            .map(|a| a.session_id)
            .ok_or(OrchestratorError::NoSession)?;

        if let Err(e) = self.services.index.clear(session_id).await {
            warn!("Failed to clear chunks for session {session_id}: {e}");
        }
        self.services.store.delete_session(session_id).await?;

        *inner = None;
        info!("Ended session {session_id}");
        Ok(session_id)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Query pipeline
    // ────────────────────────────────────────────────────────────────────────

    /// Runs one query to completion. Only `NoSession` is returned as `Err`;
    /// every pipeline failure becomes an error `QueryResult` and a system message.
    pub async fn process_query(
        &self,
        query: &str,
        context: Option<&Value>,
    ) -> Result<QueryResult, OrchestratorError> {
        let mut inner = self.inner.lock().await;
        let active = inner.as_mut().ok_or(OrchestratorError::NoSession)?;
        let session_id = active.session_id;

        match self.run_pipeline(active, query, context).await {
            Ok(result) => {
                debug!(
                    "Query finished for session {session_id} (success: {})",
                    result.is_success()
                );
                Ok(result)
            }
            Err(e) => {
                error!("Query pipeline failed for session {session_id}: {e}");
                let message = format!("Error processing query: {e}");
                self.record_system_message(session_id, &message).await;
                Ok(QueryResult::error(message))
            }
        }
    }

    async fn run_pipeline(
        &self,
        active: &mut ActiveSession,
        query: &str,
        context: Option<&Value>,
    ) -> Result<QueryResult, OrchestratorError> {
        let store = &self.services.store;
        let session_id = active.session_id;

        if let Some(history) = supplied_history(context) {
            active.conversation = history;
        }

        // 1. user turn
        store
            .append_message(session_id, Role::User, query, None)
            .await?;
        active.conversation.push(ConversationTurn {
            role: Role::User,
            content: query.to_string(),
        });

        // 2. classify
        let classify_context = self.classification_context(context, &active.conversation);
        let decision = self
            .services
            .classifier
            .classify(query, Some(&classify_context))
            .await;

        // 3. current document
        let full_text = store
            .get_latest_version(session_id)
            .await?
            .map(|v| v.content)
            .ok_or(OrchestratorError::NoDocument(session_id))?;

        // 4. retrieve
        let retrieved = self.services.retriever.retrieve(query, session_id).await;
        let used_rag = retrieved.is_some();

        // 5. dispatch
        let resolved_section = OnceCell::new();
        let mut request = DispatchRequest {
            query,
            decision: &decision,
            document_text: retrieved.as_deref().unwrap_or(full_text.as_str()),
            full_text: &full_text,
            used_rag,
            conversation: &active.conversation,
            resolved_section: &resolved_section,
        };
        let mut outcome = self.services.dispatcher.dispatch(&request).await;

        // 6. one retry on the full document
        let mut used_fallback = false;
        if outcome == HandlerOutcome::NeedsFullContext {
            info!(
                "Retrieved context insufficient for {}, retrying with full document",
                decision.agent_type.as_str()
            );
            request.document_text = full_text.as_str();
            request.used_rag = false;
            used_fallback = true;
            outcome = self.services.dispatcher.dispatch(&request).await;
        }

        let routing = RoutingInfo {
            agent_type: decision.agent_type,
            confidence: decision.confidence,
            reasoning: decision.reasoning.clone(),
            used_rag,
            used_fallback,
        };
        let mut result = QueryResult::error(String::new());
        result.routing = Some(routing);
        result.next_steps = decision
            .agent_type
            .next_steps()
            .iter()
            .map(|s| s.to_string())
            .collect();

        // 7-8. persist the new version
        let mut current_text = full_text.clone();
        match outcome {
            HandlerOutcome::Success(success) => {
                result.status = QueryStatus::Success;
                result.response = success.response;
                result.improvements = success.improvements;
                result.match_score = success.match_score;

                if let Some(document) = success.updated_document {
                    let label = success
                        .version_label
                        .unwrap_or_else(|| UPDATED_LABEL.to_string());
                    let version = store
                        .append_version(
                            session_id,
                            &document,
                            &label,
                            Some(json!({ "agent_type": decision.agent_type })),
                        )
                        .await?;
                    self.reindex(session_id, &version).await;

                    result.version_id = Some(version.id);
                    result.version_label = Some(label);
                    current_text = document.clone();
                    result.updated_document = Some(document);
                }
            }
            HandlerOutcome::NeedsInput { field, prompt } => {
                result.status = QueryStatus::NeedsInput;
                result.response = prompt;
                result.needs_input = Some(field.to_string());
            }
            HandlerOutcome::Error(HandlerFailure::Resolution(failure)) => {
                result.response = format!("{failure}. Which one would you like to enhance?");
            }
            HandlerOutcome::Error(failure @ HandlerFailure::Handler(_)) => {
                let message = format!("Error processing query: {failure}");
                warn!("Handler failed for session {session_id}: {failure}");
                self.record_system_message(session_id, &message).await;
                result.response = message;
                result.available_sections = Sections::parse(&current_text).headers();
                return Ok(result);
            }
            HandlerOutcome::NeedsFullContext => {
                result.response =
                    "Error processing query: not enough document context to complete the request"
                        .to_string();
            }
        }
        result.available_sections = Sections::parse(&current_text).headers();

        // 9. assistant turn
        store
            .append_message(
                session_id,
                Role::Assistant,
                &result.response,
                Some(json!({
                    "agent_type": decision.agent_type,
                    "confidence": decision.confidence,
                    "used_rag": used_rag,
                    "used_fallback": used_fallback,
                })),
            )
            .await?;

        // 10. buffer
        active.conversation.push(ConversationTurn {
            role: Role::Assistant,
            content: result.response.clone(),
        });

        debug!(
            "Query done for session {session_id}: {:?} via {} (rag={used_rag}, fallback={used_fallback})",
            result.status,
            decision.agent_type.as_str()
        );
        Ok(result)
    }

    /// Caller context plus the most recent turns of the buffer.
    fn classification_context(&self, context: Option<&Value>, conversation: &[ConversationTurn]) -> Value {
        let mut map = match context {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        let skip = conversation.len().saturating_sub(self.services.settings.history_turns);
        map.insert(
            "conversation_history".to_string(),
            json!(&conversation[skip..]),
        );
        Value::Object(map)
    }

    // ────────────────────────────────────────────────────────────────────────
    // History
    // ────────────────────────────────────────────────────────────────────────

    /// Appends a copy of an earlier version of this session as the new current
    /// version. Existing versions are never touched.
    pub async fn revert_to_version(
        &self,
        version_id: Uuid,
    ) -> Result<DocumentVersion, OrchestratorError> {
        let inner = self.inner.lock().await;
        let session_id = active_id(&*inner)?;
        let store = &self.services.store;

        let target = store
            .get_version_by_id(version_id)
            .await?
            .filter(|v| v.session_id == session_id)
            .ok_or(OrchestratorError::VersionNotFound(version_id))?;

        let version = store
            .append_version(
                session_id,
                &target.content,
                &format!("Reverted to {}", target.label),
                Some(json!({ "reverted_from": target.id })),
            )
            .await?;
        self.reindex(session_id, &version).await;

        store
            .append_message(
                session_id,
                Role::System,
                &format!("Document reverted to version '{}'", target.label),
                Some(json!({ "version_id": version.id, "reverted_from": target.id })),
            )
            .await?;

        info!(
            "Session {session_id} reverted to '{}' as version {}",
            target.label, version.seq
        );
        Ok(version)
    }

    pub async fn versions(&self) -> Result<Vec<DocumentVersion>, OrchestratorError> {
        let session_id = {
            let inner = self.inner.lock().await;
            active_id(&*inner)?
        };
        Ok(self.services.store.get_versions(session_id).await?)
    }

    pub async fn messages(&self, limit: Option<usize>) -> Result<Vec<MessageRecord>, OrchestratorError> {
        let session_id = {
            let inner = self.inner.lock().await;
            active_id(&*inner)?
        };
        Ok(self.services.store.get_messages(session_id, limit).await?)
    }

    pub async fn session_info(&self) -> Result<SessionInfo, OrchestratorError> {
        let state = self.state();
        let inner = self.inner.lock().await;
        let active = inner.as_ref().ok_or(OrchestratorError::NoSession)?;
        let store = &self.services.store;

        let record = store
            .get_session(active.session_id)
            .await?
            .ok_or(OrchestratorError::SessionNotFound(active.session_id))?;
        let versions = store.get_versions(active.session_id).await?;
        let message_count = store.get_messages(active.session_id, None).await?.len();

        let current_version = versions.last().cloned();
        let text = current_version
            .as_ref()
            .map(|v| v.content.as_str())
            .unwrap_or_default();

        Ok(SessionInfo {
            session_id: active.session_id,
            state,
            owner_id: record.owner_id,
            version_count: versions.len(),
            message_count,
            document: DocumentSummary {
                file_name: active.file_name.clone(),
                word_count: text.split_whitespace().count(),
                sections: Sections::parse(text).headers(),
            },
            current_version,
        })
    }

    pub async fn decompose(&self, query: &str) -> Vec<SubTask> {
        self.services.classifier.decompose(query).await
    }

    // ────────────────────────────────────────────────────────────────────────
    // Helpers
    // ────────────────────────────────────────────────────────────────────────

    /// Swaps the session's chunks for the given version. If the swap fails the
    /// chunks are cleared instead, so stale text is never retrievable.
    async fn reindex(&self, session_id: Uuid, version: &DocumentVersion) {
        let metadata = json!({ "version_id": version.id, "version_label": version.label });
        if let Err(e) = self
            .services
            .index
            .replace(session_id, &version.content, metadata)
            .await
        {
            warn!("Re-index failed for session {session_id}, clearing stale chunks: {e}");
            if let Err(e) = self.services.index.clear(session_id).await {
                warn!("Failed to clear chunks for session {session_id}: {e}");
            }
        }
    }

    async fn record_system_message(&self, session_id: Uuid, message: &str) {
        if let Err(e) = self
            .services
            .store
            .append_message(session_id, Role::System, message, None)
            .await
        {
            warn!("Failed to record system message for session {session_id}: {e}");
        }
    }
}

fn active_id(inner: &Option<ActiveSession>) -> Result<Uuid, OrchestratorError> {
    inner
        .as_ref()
        .map(|a| a.session_id)
        .ok_or(OrchestratorError::NoSession)
}

/// A caller-supplied `conversation_history` replaces the buffer.
fn supplied_history(context: Option<&Value>) -> Option<Vec<ConversationTurn>> {
    let history = context?.get("conversation_history")?;
    match serde_json::from_value(history.clone()) {
        Ok(turns) => Some(turns),
        Err(e) => {
            warn!("Ignoring malformed conversation_history: {e}");
            None
        }
    }
}
