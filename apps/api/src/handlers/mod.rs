//! Task handlers: the generative workers behind each agent type.
//!
//! The orchestrator only sees the `TaskHandler` and `MatchAnalyzer` traits.
//! `HandlerSet::llm` wires the Claude-backed implementations; tests swap in fakes.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::llm_client::prompts::{AUTHENTICITY_INSTRUCTION, OUTPUT_LAYOUT_INSTRUCTION};
use crate::llm_client::{Completion, LlmError};
use crate::routing::{AgentType, ENTITY_COMPANY, ENTITY_SECTION};
use crate::store::Role;

pub mod prompts;

use prompts::*;

/// Characters of document text the general Q&A handler is shown.
pub const GENERAL_DOCUMENT_CHARS: usize = 3000;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Handler failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

/// Everything a handler is given for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct HandlerTask<'a> {
    /// The user's request (for job match, the job description itself).
    pub description: &'a str,
    /// Document text to work on: retrieved context, the full document, or one section.
    pub primary_text: &'a str,
    /// Supporting text shown alongside `primary_text`, if any.
    pub context_text: Option<&'a str>,
    pub entities: &'a BTreeMap<String, String>,
    pub conversation: &'a [ConversationTurn],
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, task: &HandlerTask<'_>) -> Result<String, HandlerError>;
}

/// Structured-score variant used by job matching. The returned analysis text
/// is expected to mention a score.
#[async_trait]
pub trait MatchAnalyzer: Send + Sync {
    async fn analyze(&self, document: &str, job_description: &str)
        -> Result<String, HandlerError>;
}

#[derive(Clone)]
pub struct HandlerSet {
    pub company_fit: Arc<dyn TaskHandler>,
    pub job_match: Arc<dyn TaskHandler>,
    pub match_analyzer: Arc<dyn MatchAnalyzer>,
    pub section_enhance: Arc<dyn TaskHandler>,
    pub general: Arc<dyn TaskHandler>,
}

impl HandlerSet {
    pub fn llm(llm: Arc<dyn Completion>) -> Self {
        Self {
            company_fit: Arc::new(LlmTaskHandler::new(llm.clone(), AgentType::CompanyFit)),
            job_match: Arc::new(LlmTaskHandler::new(llm.clone(), AgentType::JobMatch)),
            match_analyzer: Arc::new(LlmMatchAnalyzer::new(llm.clone())),
            section_enhance: Arc::new(LlmTaskHandler::new(llm.clone(), AgentType::SectionEnhance)),
            general: Arc::new(LlmTaskHandler::new(llm, AgentType::General)),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Claude-backed handlers
// ────────────────────────────────────────────────────────────────────────────

pub struct LlmTaskHandler {
    llm: Arc<dyn Completion>,
    agent: AgentType,
}

impl LlmTaskHandler {
    pub fn new(llm: Arc<dyn Completion>, agent: AgentType) -> Self {
        Self { llm, agent }
    }

    fn build_prompt(&self, task: &HandlerTask<'_>) -> (String, &'static str) {
        match self.agent {
            AgentType::CompanyFit => {
                let company = task
                    .entities
                    .get(ENTITY_COMPANY)
                    .map(String::as_str)
                    .unwrap_or("the target company");
                let prompt = COMPANY_FIT_PROMPT
                    .replace("{authenticity}", AUTHENTICITY_INSTRUCTION)
                    .replace("{layout}", OUTPUT_LAYOUT_INSTRUCTION)
                    .replace("{company}", company)
                    .replace("{resume}", task.primary_text);
                (prompt, WRITER_SYSTEM)
            }
            AgentType::JobMatch => {
                let prompt = JOB_MATCH_PROMPT
                    .replace("{authenticity}", AUTHENTICITY_INSTRUCTION)
                    .replace("{layout}", OUTPUT_LAYOUT_INSTRUCTION)
                    .replace("{resume}", task.primary_text)
                    .replace("{job_description}", task.description);
                (prompt, WRITER_SYSTEM)
            }
            AgentType::SectionEnhance => {
                let section = task
                    .entities
                    .get(ENTITY_SECTION)
                    .map(String::as_str)
                    .unwrap_or("requested");
                let prompt = SECTION_ENHANCE_PROMPT
                    .replace("{authenticity}", AUTHENTICITY_INSTRUCTION)
                    .replace("{guidelines}", &guidelines_for(section))
                    .replace("{context}", task.context_text.unwrap_or("None provided"))
                    .replace("{request}", task.description)
                    .replace("{content}", task.primary_text)
                    .replace("{section}", section);
                (prompt, WRITER_SYSTEM)
            }
            AgentType::General => {
                let history = format_history(task.conversation);
                let resume = if task.primary_text.trim().is_empty() {
                    "No resume uploaded yet.".to_string()
                } else {
                    truncate_chars(task.primary_text, GENERAL_DOCUMENT_CHARS)
                };
                let prompt = GENERAL_PROMPT
                    .replace("{history}", &history)
                    .replace("{resume}", &resume)
                    .replace("{query}", task.description);
                (prompt, ADVISOR_SYSTEM)
            }
        }
    }
}

#[async_trait]
impl TaskHandler for LlmTaskHandler {
    async fn run(&self, task: &HandlerTask<'_>) -> Result<String, HandlerError> {
        let (prompt, system) = self.build_prompt(task);
        debug!(
            "Running {} handler ({} chars of document)",
            self.agent.as_str(),
            task.primary_text.len()
        );
        Ok(self.llm.complete(&prompt, system).await?)
    }
}

pub struct LlmMatchAnalyzer {
    llm: Arc<dyn Completion>,
}

impl LlmMatchAnalyzer {
    pub fn new(llm: Arc<dyn Completion>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl MatchAnalyzer for LlmMatchAnalyzer {
    async fn analyze(&self, document: &str, job_description: &str) -> Result<String, HandlerError> {
        let prompt = MATCH_ANALYSIS_PROMPT
            .replace("{resume}", document)
            .replace("{job_description}", job_description);
        Ok(self.llm.complete(&prompt, WRITER_SYSTEM).await?)
    }
}

/// Guidance for the section type; substring match in either direction.
pub fn guidelines_for(section: &str) -> String {
    let upper = section.to_uppercase();
    SECTION_GUIDELINES
        .iter()
        .find(|(key, _)| upper.contains(key) || key.contains(upper.as_str()))
        .map(|(_, text)| format!("Guidelines for {section}:\n{text}"))
        .unwrap_or_else(|| DEFAULT_GUIDELINES.to_string())
}

fn format_history(turns: &[ConversationTurn]) -> String {
    if turns.is_empty() {
        return "None".to_string();
    }
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role.as_str(), t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// First `max` characters of `text`, on a char boundary, with an ellipsis when cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
