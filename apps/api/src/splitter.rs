//! Content/Narration Splitter: separates a handler's raw output into the
//! document fragment and the explanatory commentary around it.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::llm_client::Completion;

pub const CONTENT_MARKER: &str = "===RESUME_CONTENT===";
pub const NARRATION_MARKER: &str = "===IMPROVEMENTS===";
pub const END_MARKER: &str = "===END===";

const SPLIT_SYSTEM: &str =
    "You are a precise text extraction assistant. Follow the output format exactly.";

/// Replace `{raw}` before sending.
const SPLIT_PROMPT_TEMPLATE: &str = r#"The text below was produced by a resume-writing assistant. It contains BOTH:
1. resume content (name, contact, experience, education, skills, ...)
2. commentary about the changes ("Here's the optimized resume", "Key changes:", ...)

Separate the two.
- Put ONLY resume content in the first region, with no meta-commentary.
- Put ALL explanations and improvement notes in the second region.
- If there is no commentary, leave the second region empty.
- If there is no resume content, leave the first region empty.

Text:
{raw}

Respond in this EXACT format:
===RESUME_CONTENT===
[resume content, or nothing]
===IMPROVEMENTS===
[commentary, or nothing]
===END==="#;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SplitResult {
    pub document: String,
    pub narration: String,
}

impl SplitResult {
    /// Degraded split: everything is document.
    pub fn whole(raw: &str) -> Self {
        Self {
            document: raw.trim().to_string(),
            narration: String::new(),
        }
    }
}

/// Parses sentinel-delimited text. Both leading markers must be present and in
/// order; the end marker is optional.
pub fn parse_delimited(text: &str) -> Option<SplitResult> {
    let content_start = text.find(CONTENT_MARKER)? + CONTENT_MARKER.len();
    let after_content = &text[content_start..];
    let narration_at = after_content.find(NARRATION_MARKER)?;

    let document = after_content[..narration_at].trim();
    let rest = &after_content[narration_at + NARRATION_MARKER.len()..];
    let narration = rest.split(END_MARKER).next().unwrap_or_default().trim();

    Some(SplitResult {
        document: document.to_string(),
        narration: narration.to_string(),
    })
}

#[derive(Clone)]
pub struct NarrationSplitter {
    llm: Arc<dyn Completion>,
}

impl NarrationSplitter {
    pub fn new(llm: Arc<dyn Completion>) -> Self {
        Self { llm }
    }

    /// Never fails. Output that already carries the markers is parsed without an
    /// LLM call; anything unparseable degrades to `SplitResult::whole(raw)`.
    pub async fn split(&self, raw: &str) -> SplitResult {
        if let Some(split) = parse_delimited(raw) {
            return split;
        }

        let prompt = SPLIT_PROMPT_TEMPLATE.replace("{raw}", raw);
        let split = match self.llm.complete(&prompt, SPLIT_SYSTEM).await {
            Ok(extracted) => parse_delimited(&extracted).unwrap_or_else(|| {
                warn!("Splitter output had no markers, keeping raw output as document");
                SplitResult::whole(raw)
            }),
            Err(e) => {
                warn!("Splitter call failed, keeping raw output as document: {e}");
                SplitResult::whole(raw)
            }
        };

        debug!(
            "Split output: {} chars document, {} chars narration",
            split.document.len(),
            split.narration.len()
        );
        split
    }
}
