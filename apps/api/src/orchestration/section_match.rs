//! Section resolution: maps a user's section name ("work history") onto one of
//! the document's parsed headers ("EXPERIENCE").
//!
//! Strategies run in order; the first to return a header wins:
//! 1. `SubstringMatcher`: case-insensitive containment, either direction
//! 2. `SemanticMatcher`: LLM pick, validated against the available headers
//! 3. `TokenOverlapMatcher`: shared words
//!
//! An exact (case-insensitive) header name short-circuits the chain.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm_client::Completion;

const SEMANTIC_SYSTEM: &str = "You are a resume section matching expert. \
    Answer with ONLY one section name copied exactly from the list, or NONE.";

/// Replace `{requested}` and `{available}`.
const SEMANTIC_PROMPT_TEMPLATE: &str = r#"Match the requested section name to the most appropriate available section.
Consider semantic similarity and common variations, for example:
- "work history" or "jobs" -> "EXPERIENCE" or "WORK EXPERIENCE"
- "education background" -> "EDUCATION"
- "technical skills" -> "SKILLS" or "TECHNICAL SKILLS"
- "summary" or "profile" -> "SUMMARY", "PROFILE" or "OBJECTIVE"

Requested section: {requested}
Available sections: {available}

Return only the exact section name, or NONE if nothing fits."#;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("No section matching '{requested}'. Available sections: {}", .available.join(", "))]
pub struct ResolutionFailure {
    pub requested: String,
    pub available: Vec<String>,
}

#[async_trait]
pub trait SectionMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn try_match(&self, requested: &str, available: &[String]) -> Option<String>;
}

pub struct SubstringMatcher;

#[async_trait]
impl SectionMatcher for SubstringMatcher {
    fn name(&self) -> &'static str {
        "substring"
    }

    async fn try_match(&self, requested: &str, available: &[String]) -> Option<String> {
        let requested = requested.trim().to_lowercase();
        if requested.is_empty() {
            return None;
        }
        available
            .iter()
            .find(|header| {
                let header = header.to_lowercase();
                header.contains(&requested) || requested.contains(&header)
            })
            .cloned()
    }
}

pub struct SemanticMatcher {
    llm: Arc<dyn Completion>,
}

impl SemanticMatcher {
    pub fn new(llm: Arc<dyn Completion>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl SectionMatcher for SemanticMatcher {
    fn name(&self) -> &'static str {
        "semantic"
    }

    async fn try_match(&self, requested: &str, available: &[String]) -> Option<String> {
        if available.is_empty() {
            return None;
        }
        let prompt = SEMANTIC_PROMPT_TEMPLATE
            .replace("{available}", &available.join(", "))
            .replace("{requested}", requested);

        let answer = match self.llm.complete(&prompt, SEMANTIC_SYSTEM).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Semantic section matching failed: {e}");
                return None;
            }
        };

        let answer = answer.trim().trim_matches(|c: char| c == '"' || c == '\'' || c == '.');
        if answer.eq_ignore_ascii_case("NONE") {
            return None;
        }
        // Only headers that actually exist are accepted.
        available
            .iter()
            .find(|header| header.as_str() == answer)
            .or_else(|| available.iter().find(|h| h.eq_ignore_ascii_case(answer)))
            .cloned()
    }
}

pub struct TokenOverlapMatcher;

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| {
            let t = t.to_lowercase();
            t.strip_suffix('s').map(str::to_string).unwrap_or(t)
        })
        .collect()
}

#[async_trait]
impl SectionMatcher for TokenOverlapMatcher {
    fn name(&self) -> &'static str {
        "token_overlap"
    }

    async fn try_match(&self, requested: &str, available: &[String]) -> Option<String> {
        let wanted = tokens(requested);
        available
            .iter()
            .map(|header| (header, tokens(header).intersection(&wanted).count()))
            .filter(|(_, overlap)| *overlap > 0)
            // max_by_key keeps the last maximum; reverse so the first header wins ties
            .rev()
            .max_by_key(|(_, overlap)| *overlap)
            .map(|(header, _)| header.clone())
    }
}

pub struct SectionResolver {
    matchers: Vec<Box<dyn SectionMatcher>>,
}

impl SectionResolver {
    pub fn new(matchers: Vec<Box<dyn SectionMatcher>>) -> Self {
        Self { matchers }
    }

    /// Substring, then semantic, then token overlap.
    pub fn standard(llm: Arc<dyn Completion>) -> Self {
        Self::new(vec![
            Box::new(SubstringMatcher),
            Box::new(SemanticMatcher::new(llm)),
            Box::new(TokenOverlapMatcher),
        ])
    }

    pub async fn resolve(
        &self,
        requested: &str,
        available: &[String],
    ) -> Result<String, ResolutionFailure> {
        let requested = requested.trim();

        if let Some(exact) = available.iter().find(|h| h.eq_ignore_ascii_case(requested)) {
            return Ok(exact.clone());
        }

        for matcher in &self.matchers {
            if let Some(header) = matcher.try_match(requested, available).await {
                debug!(
                    "Resolved section '{requested}' to '{header}' via {}",
                    matcher.name()
                );
                return Ok(header);
            }
        }

        Err(ResolutionFailure {
            requested: requested.to_string(),
            available: available.to_vec(),
        })
    }
}
