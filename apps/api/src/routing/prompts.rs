// All LLM prompt constants for the Routing module.

/// System prompt for intent classification: enforces JSON-only output.
pub const CLASSIFY_SYSTEM: &str =
    "You are an intelligent conversation router for a resume optimization service. \
    Decide which specialised handler should serve the user's request. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Classification prompt. Replace `{query}` and `{context}` before sending.
pub const CLASSIFY_PROMPT_TEMPLATE: &str = r#"Route the user's query to exactly one handler.

HANDLERS:

1. "company_fit": tailor the resume to a specific company's culture and values.
   e.g. "Optimize my resume for Google", "Make my resume fit Apple's values"

2. "job_match": match the resume against a job description, analyse fit, ATS compatibility.
   e.g. "How well does my resume match this posting?", "Update my resume for these requirements"

3. "section_enhance": improve one named section of the resume.
   e.g. "Improve my experience section", "Make my skills more impactful", "Enhance my summary"

4. "general": greetings, questions, advice, vague or meta requests.
   e.g. "Hello", "What can you do?", "Help me with my resume"

RULES:
- Choose by intent. If several handlers plausibly fit, choose the MOST SPECIFIC one.
- Greetings, vague requests and questions about the service are "general".
- Extract entities: "company_name" for a target company, "section_name" for a resume section.
  Omit entities that are not mentioned.
- Set "needs_follow_up" to true when the request cannot be served without more information.

Return a JSON object with this EXACT schema:
{
  "agent_type": "company_fit" | "job_match" | "section_enhance" | "general",
  "confidence": 0.0-1.0,
  "reasoning": "one sentence",
  "entities": {"company_name": "...", "section_name": "..."},
  "needs_follow_up": false
}

User query: {query}

Previous context: {context}"#;

/// Decomposition prompt. Replace `{query}` before sending.
pub const DECOMPOSE_PROMPT_TEMPLATE: &str = r#"Decide whether this query contains several distinct requests that should be handled separately.

Query: "{query}"

If the query contains multiple requests (joined by "and", "also", "then", ...), split it into ordered tasks.
If it is a single request, return it as one task.

Return a JSON array with this EXACT schema:
[
  {"description": "task description", "intent": "company_fit" | "job_match" | "section_enhance" | "general"}
]"#;
