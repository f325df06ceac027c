use serde::Serialize;
use uuid::Uuid;

use super::section_match::ResolutionFailure;
use crate::routing::AgentType;

/// What one handler invocation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    Success(HandlerSuccess),
    /// A required entity or input is missing; nothing was generated.
    NeedsInput { field: &'static str, prompt: String },
    /// The retrieved context was not enough; retry with the full document.
    NeedsFullContext,
    Error(HandlerFailure),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerSuccess {
    pub response: String,
    /// Full document text of the new version, when the handler changed it.
    pub updated_document: Option<String>,
    pub version_label: Option<String>,
    pub improvements: Option<String>,
    pub match_score: Option<u32>,
}

impl HandlerSuccess {
    pub fn reply(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HandlerFailure {
    #[error(transparent)]
    Resolution(#[from] ResolutionFailure),

    #[error("{0}")]
    Handler(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Success,
    NeedsInput,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutingInfo {
    pub agent_type: AgentType,
    pub confidence: f64,
    pub reasoning: String,
    pub used_rag: bool,
    pub used_fallback: bool,
}

/// The structured result of one `process_query` call.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub status: QueryStatus,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needs_input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_document: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub improvements: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_score: Option<u32>,
    pub available_sections: Vec<String>,
    pub next_steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingInfo>,
}

impl QueryResult {
    /// An error turn with nothing but a message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: QueryStatus::Error,
            response: message.into(),
            needs_input: None,
            updated_document: None,
            version_id: None,
            version_label: None,
            improvements: None,
            match_score: None,
            available_sections: Vec::new(),
            next_steps: Vec::new(),
            routing: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }
}
