//! Process-wide map of live sessions. Each session gets its own `Orchestrator`;
//! all of them share one `Services`.
//!
//! The map lock only guards slot lookup. Attaching a stored session happens in
//! the session's own `OnceCell`, so a slow attach never blocks other sessions.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::orchestrator::{Orchestrator, OrchestratorError, Services, SessionStarted};
use super::outcome::QueryResult;
use crate::document::ParsedDocument;
use crate::store::DocumentVersion;

type Slot = Arc<OnceCell<Arc<Orchestrator>>>;

pub struct SessionRegistry {
    services: Services,
    sessions: RwLock<HashMap<Uuid, Slot>>,
}

impl SessionRegistry {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub async fn start(
        &self,
        document: ParsedDocument,
        owner_id: Option<&str>,
    ) -> Result<SessionStarted, OrchestratorError> {
        let orchestrator = Arc::new(Orchestrator::new(self.services.clone()));
        let started = orchestrator.start_with_document(document, owner_id).await?;
        self.sessions
            .write()
            .await
            .insert(started.session_id, Arc::new(OnceCell::from(orchestrator)));
        Ok(started)
    }

    /// Returns the live orchestrator for a session, attaching it from the
    /// store on first use after a restart.
    pub async fn get(&self, session_id: Uuid) -> Result<Arc<Orchestrator>, OrchestratorError> {
        let slot = self.slot(session_id).await;

        let attached = slot
            .get_or_try_init(|| async {
                let orchestrator = Arc::new(Orchestrator::new(self.services.clone()));
                orchestrator.attach_session(session_id).await?;
                debug!("Attached stored session {session_id}");
                Ok::<_, OrchestratorError>(orchestrator)
            })
            .await;

        match attached {
            Ok(orchestrator) => Ok(orchestrator.clone()),
            Err(e) => {
                self.discard_empty_slot(session_id, &slot).await;
                Err(e)
            }
        }
    }

    /// Runs a query on its own task. Dropping the caller (a disconnected
    /// client) does not interrupt the pipeline mid-commit.
    pub async fn query(
        &self,
        session_id: Uuid,
        query: String,
        context: Option<Value>,
    ) -> Result<QueryResult, OrchestratorError> {
        let orchestrator = self.get(session_id).await?;
        tokio::spawn(async move { orchestrator.process_query(&query, context.as_ref()).await })
            .await?
    }

    /// Reverts on its own task, for the same reason as `query`.
    pub async fn revert(
        &self,
        session_id: Uuid,
        version_id: Uuid,
    ) -> Result<DocumentVersion, OrchestratorError> {
        let orchestrator = self.get(session_id).await?;
        tokio::spawn(async move { orchestrator.revert_to_version(version_id).await }).await?
    }

    /// Ends a session. A session that is not live is deleted straight from the
    /// store and index instead of being attached first.
    pub async fn end(&self, session_id: Uuid) -> Result<(), OrchestratorError> {
        let live = self
            .sessions
            .read()
            .await
            .get(&session_id)
            .and_then(|slot| slot.get().cloned());

        match live {
            Some(orchestrator) => {
                orchestrator.end_session().await?;
            }
            None => {
                if let Err(e) = self.services.index.clear(session_id).await {
                    warn!("Failed to clear chunks for session {session_id}: {e}");
                }
                self.services.store.delete_session(session_id).await?;
                info!("Ended stored session {session_id}");
            }
        }

        self.sessions.write().await.remove(&session_id);
        Ok(())
    }

    /// Sessions with a live orchestrator in this process.
    pub async fn active_count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    async fn slot(&self, session_id: Uuid) -> Slot {
        if let Some(slot) = self.sessions.read().await.get(&session_id) {
            return slot.clone();
        }
        self.sessions
            .write()
            .await
            .entry(session_id)
            .or_default()
            .clone()
    }

    /// Drops a slot whose attach failed, so unknown ids do not accumulate.
    async fn discard_empty_slot(&self, session_id: Uuid, slot: &Slot) {
        let mut sessions = self.sessions.write().await;
        if let Some(current) = sessions.get(&session_id) {
            if Arc::ptr_eq(current, slot) && !current.initialized() {
                sessions.remove(&session_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::handlers::HandlerSet;
    use crate::index::{MemorySemanticIndex, SemanticIndex};
    use crate::orchestration::outcome::QueryStatus;
    use crate::orchestration::OrchestratorSettings;
    use crate::store::{MemorySessionStore, Role, SessionStore};
    use crate::testing::{
        HashingEmbedder, ScriptedCompletion, SlowIndex, StaticAnalyzer, StaticHandler,
    };

    const RESUME: &str = "Jane Doe\njane@example.com\n\nSUMMARY: Backend engineer with eight years building payment systems.\nSKILLS: Rust, Go, Postgres";
    const NEW_SKILLS: &str = "Languages: Rust, Go, TypeScript\nStreaming: Kafka, Flink";

    fn memory_index() -> Arc<dyn SemanticIndex> {
        Arc::new(MemorySemanticIndex::new(Arc::new(HashingEmbedder::default()), 500))
    }

    fn registry(store: Arc<MemorySessionStore>) -> SessionRegistry {
        let llm = Arc::new(ScriptedCompletion::new(vec![r#"{"agent_type": "general"}"#]));
        SessionRegistry::new(Services::build(
            llm,
            store,
            memory_index(),
            OrchestratorSettings::default(),
        ))
    }

    /// Registry whose section handler rewrites SKILLS and whose index is slow to re-index.
    fn slow_registry(store: Arc<MemorySessionStore>, index: Arc<dyn SemanticIndex>) -> SessionRegistry {
        let handler = Arc::new(StaticHandler::new(&format!(
            "===RESUME_CONTENT===\n{NEW_SKILLS}\n===IMPROVEMENTS===\nAdded streaming\n===END==="
        )));
        let handlers = HandlerSet {
            company_fit: handler.clone(),
            job_match: handler.clone(),
            match_analyzer: Arc::new(StaticAnalyzer("Score: 70/100")),
            section_enhance: handler.clone(),
            general: handler,
        };
        let classifier = Arc::new(ScriptedCompletion::new(vec![
            r#"{"agent_type": "section_enhance", "confidence": 0.9, "reasoning": "one section",
                "entities": {"section_name": "Skills"}}"#,
        ]));
        SessionRegistry::new(Services::with_handlers(
            classifier,
            handlers,
            store,
            Arc::new(SlowIndex::new(index, Duration::from_millis(200))),
            OrchestratorSettings::default(),
        ))
    }

    fn document() -> ParsedDocument {
        ParsedDocument::from_text("resume.txt", RESUME).unwrap()
    }

    #[tokio::test]
    async fn test_sessions_get_independent_orchestrators() {
        let registry = registry(Arc::new(MemorySessionStore::new()));
        let a = registry.start(document(), None).await.unwrap().session_id;
        let b = registry.start(document(), None).await.unwrap().session_id;

        assert_ne!(a, b);
        assert_eq!(registry.active_count().await, 2);
        let first = registry.get(a).await.unwrap();
        assert_eq!(first.session_id().await, Some(a));
        assert!(Arc::ptr_eq(&first, &registry.get(a).await.unwrap()));
    }

    #[tokio::test]
    async fn test_stored_session_is_attached_lazily() {
        let store = Arc::new(MemorySessionStore::new());
        let session_id = registry(store.clone())
            .start(document(), None)
            .await
            .unwrap()
            .session_id;

        // A fresh registry over the same store, as after a restart
        let restarted = registry(store);
        assert_eq!(restarted.active_count().await, 0);
        let orchestrator = restarted.get(session_id).await.unwrap();
        assert_eq!(orchestrator.session_id().await, Some(session_id));
        assert_eq!(orchestrator.versions().await.unwrap().len(), 1);
        assert_eq!(restarted.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_and_ended_sessions_are_not_found() {
        let store = Arc::new(MemorySessionStore::new());
        let registry = registry(store.clone());
        assert!(matches!(
            registry.get(Uuid::new_v4()).await,
            Err(OrchestratorError::SessionNotFound(_))
        ));
        assert!(registry.sessions.read().await.is_empty());

        let session_id = registry.start(document(), None).await.unwrap().session_id;
        registry.end(session_id).await.unwrap();
        assert!(store.get_session(session_id).await.unwrap().is_none());
        assert!(registry.get(session_id).await.is_err());
    }

    #[tokio::test]
    async fn test_ending_a_cold_session_skips_attach() {
        let store = Arc::new(MemorySessionStore::new());
        let session_id = registry(store.clone())
            .start(document(), None)
            .await
            .unwrap()
            .session_id;

        // Any attach would re-index through the slow index first
        let restarted = slow_registry(store.clone(), memory_index());
        tokio::time::timeout(Duration::from_millis(100), restarted.end(session_id))
            .await
            .expect("ending a stored session should not attach it")
            .unwrap();

        assert!(store.get_session(session_id).await.unwrap().is_none());
        assert!(matches!(
            restarted.end(session_id).await,
            Err(OrchestratorError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_cold_attach_does_not_block_live_sessions() {
        let store = Arc::new(MemorySessionStore::new());
        let cold = registry(store.clone())
            .start(document(), None)
            .await
            .unwrap()
            .session_id;

        let registry = Arc::new(slow_registry(store, memory_index()));
        let live = registry.start(document(), None).await.unwrap().session_id;

        // The cold session has no chunks in this index, so attaching re-indexes slowly
        let attaching = tokio::spawn({
            let registry = registry.clone();
            async move { registry.get(cold).await.map(|_| ()) }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let orchestrator = tokio::time::timeout(Duration::from_millis(100), registry.get(live))
            .await
            .expect("live session lookup waited on an unrelated attach")
            .unwrap();
        assert_eq!(orchestrator.session_id().await, Some(live));

        attaching.await.unwrap().unwrap();
        assert_eq!(registry.active_count().await, 2);
    }

    #[tokio::test]
    async fn test_dropped_query_still_commits_and_reindexes() {
        let store = Arc::new(MemorySessionStore::new());
        let index = memory_index();
        let registry = slow_registry(store.clone(), index.clone());
        let session_id = registry.start(document(), None).await.unwrap().session_id;

        // The caller gives up while the re-index is still sleeping
        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            registry.query(session_id, "Enhance my Skills section".to_string(), None),
        )
        .await;
        assert!(abandoned.is_err());

        let mut messages = Vec::new();
        for _ in 0..40 {
            tokio::time::sleep(Duration::from_millis(25)).await;
            messages = store.get_messages(session_id, None).await.unwrap();
            if messages.last().map(|m| m.role) == Some(Role::Assistant) {
                break;
            }
        }

        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(store.get_versions(session_id).await.unwrap().len(), 2);
        let hits = index.search("Kafka Flink", Some(session_id), 5).await.unwrap();
        assert!(hits.iter().all(|h| h.text.contains("Kafka")));
        assert!(!hits.is_empty());
    }

    #[tokio::test]
    async fn test_query_and_revert_run_through_the_registry() {
        let store = Arc::new(MemorySessionStore::new());
        let registry = slow_registry(store.clone(), memory_index());
        let session_id = registry.start(document(), None).await.unwrap().session_id;

        let result = registry
            .query(session_id, "Enhance my Skills section".to_string(), None)
            .await
            .unwrap();
        assert_eq!(result.status, QueryStatus::Success);

        let original = store.get_versions(session_id).await.unwrap()[0].id;
        let reverted = registry.revert(session_id, original).await.unwrap();
        assert_eq!(reverted.seq, 3);
        assert_eq!(reverted.content, store.get_versions(session_id).await.unwrap()[0].content);
    }
}
