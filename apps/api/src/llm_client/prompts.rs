// Shared prompt constants and prompt-building utilities.
// Each module that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Appended to every document-rewriting prompt.
pub const AUTHENTICITY_INSTRUCTION: &str = "\
    CRITICAL: Only use facts present in the resume you are given. \
    Do NOT invent employers, titles, dates, degrees, or metrics. \
    Where a quantification would help but is not supported, suggest it in your \
    explanation instead of writing it into the resume.";

/// Asks the handler to keep the document and its commentary visibly apart so the
/// narration splitter has an easier job.
pub const OUTPUT_LAYOUT_INSTRUCTION: &str = "\
    Return the complete revised text first. After it, under a heading \
    'Key Changes', list the most important changes you made and why.";
