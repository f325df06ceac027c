//! Intent Classifier: maps a query (plus optional context) to a `RouteDecision`.
//!
//! Never fails past its own boundary: any LLM or parse failure becomes a
//! low-confidence `general` route with `needs_follow_up = true`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::prompts::{CLASSIFY_PROMPT_TEMPLATE, CLASSIFY_SYSTEM, DECOMPOSE_PROMPT_TEMPLATE};
use crate::llm_client::{complete_json, prompts::JSON_ONLY_SYSTEM, Completion};

pub const ENTITY_COMPANY: &str = "company_name";
pub const ENTITY_SECTION: &str = "section_name";

const FALLBACK_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    CompanyFit,
    JobMatch,
    SectionEnhance,
    General,
}

impl AgentType {
    /// Maps a model-emitted label to an agent type. Unknown labels route to `General`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().replace(&['-', ' '][..], "_").as_str() {
            "company_fit" | "company_research" => AgentType::CompanyFit,
            "job_match" | "job_matching" => AgentType::JobMatch,
            "section_enhance" | "section_enhancement" => AgentType::SectionEnhance,
            _ => AgentType::General,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::CompanyFit => "company_fit",
            AgentType::JobMatch => "job_match",
            AgentType::SectionEnhance => "section_enhance",
            AgentType::General => "general",
        }
    }

    /// Follow-up prompts offered to the user after a turn handled by this agent.
    pub fn next_steps(&self) -> [&'static str; 3] {
        match self {
            AgentType::CompanyFit => [
                "Would you like me to analyze how well your resume matches this company?",
                "Should I enhance specific sections to better align with this company?",
                "Would you like me to compare your resume against a specific job description?",
            ],
            AgentType::JobMatch => [
                "Should I enhance the sections that need the most improvement?",
                "Would you like me to research the company culture for better alignment?",
                "Shall I work on improving your match score?",
            ],
            AgentType::SectionEnhance => [
                "Would you like me to work on other sections as well?",
                "Should I optimize the entire resume for a specific company or role?",
                "Would you like me to check how well this matches a job description?",
            ],
            AgentType::General => [
                "What would you like to improve in your resume?",
                "Are you targeting a specific company or role?",
                "Which section would you like to enhance?",
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDecision {
    pub agent_type: AgentType,
    /// Clamped to [0, 1].
    pub confidence: f64,
    pub reasoning: String,
    pub entities: BTreeMap<String, String>,
    pub needs_follow_up: bool,
}

impl RouteDecision {
    pub fn fallback(reason: impl std::fmt::Display) -> Self {
        Self {
            agent_type: AgentType::General,
            confidence: FALLBACK_CONFIDENCE,
            reasoning: format!("Fallback due to error: {reason}"),
            entities: BTreeMap::new(),
            needs_follow_up: true,
        }
    }

    pub fn entity(&self, name: &str) -> Option<&str> {
        self.entities
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    pub description: String,
    pub agent_type: AgentType,
}

/// Wire shape of the classification response. Lenient: every field has a default.
#[derive(Debug, Deserialize)]
struct RawDecision {
    #[serde(default)]
    agent_type: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: String,
    #[serde(default, alias = "extracted_entities")]
    entities: Option<Map<String, Value>>,
    #[serde(default, alias = "requires_followup")]
    needs_follow_up: bool,
}

#[derive(Debug, Deserialize)]
struct RawTask {
    #[serde(default)]
    description: String,
    #[serde(default, alias = "agent_type")]
    intent: String,
}

impl From<RawDecision> for RouteDecision {
    fn from(raw: RawDecision) -> Self {
        let entities = raw
            .entities
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(k, v)| match v {
                Value::String(s) if !s.trim().is_empty() => Some((k, s.trim().to_string())),
                Value::Null | Value::String(_) => None,
                other => Some((k, other.to_string())),
            })
            .collect();

        RouteDecision {
            agent_type: AgentType::from_label(&raw.agent_type),
            confidence: raw
                .confidence
                .filter(|c| c.is_finite())
                .unwrap_or(FALLBACK_CONFIDENCE)
                .clamp(0.0, 1.0),
            reasoning: raw.reasoning,
            entities,
            needs_follow_up: raw.needs_follow_up,
        }
    }
}

#[derive(Clone)]
pub struct IntentClassifier {
    llm: Arc<dyn Completion>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn Completion>) -> Self {
        Self { llm }
    }

    pub async fn classify(&self, query: &str, context: Option<&Value>) -> RouteDecision {
        let context_str = context
            .map(|c| c.to_string())
            .unwrap_or_else(|| "No previous context".to_string());
        let prompt = CLASSIFY_PROMPT_TEMPLATE
            .replace("{context}", &context_str)
            .replace("{query}", query);

        match complete_json::<RawDecision>(self.llm.as_ref(), &prompt, CLASSIFY_SYSTEM).await {
            Ok(raw) => {
                let decision = RouteDecision::from(raw);
                debug!(
                    "Routed to {} (confidence {:.2}): {}",
                    decision.agent_type.as_str(),
                    decision.confidence,
                    decision.reasoning
                );
                decision
            }
            Err(e) => {
                warn!("Classification failed, routing to general: {e}");
                RouteDecision::fallback(e)
            }
        }
    }

    /// Splits a conjunctive request into ordered sub-tasks.
    /// Falls back to one task routed by `classify` when the model gives nothing usable.
    pub async fn decompose(&self, query: &str) -> Vec<SubTask> {
        let prompt = DECOMPOSE_PROMPT_TEMPLATE.replace("{query}", query);

        let tasks: Vec<SubTask> =
            match complete_json::<Vec<RawTask>>(self.llm.as_ref(), &prompt, JSON_ONLY_SYSTEM).await {
                Ok(raw) => raw
                    .into_iter()
                    .map(|t| SubTask {
                        description: if t.description.trim().is_empty() {
                            query.to_string()
                        } else {
                            t.description.trim().to_string()
                        },
                        agent_type: AgentType::from_label(&t.intent),
                    })
                    .collect(),
                Err(e) => {
                    warn!("Query decomposition failed, treating as single task: {e}");
                    Vec::new()
                }
            };

        if !tasks.is_empty() {
            return tasks;
        }

        let decision = self.classify(query, None).await;
        vec![SubTask {
            description: query.to_string(),
            agent_type: decision.agent_type,
        }]
    }
}
