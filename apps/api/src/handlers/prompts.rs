// All LLM prompt constants for the task handlers.
// Reuses cross-cutting fragments from llm_client::prompts.

pub const WRITER_SYSTEM: &str = "You are an award-winning resume writer and career consultant. \
    You rewrite resumes so they are specific, quantified and tailored, while staying truthful.";

pub const ADVISOR_SYSTEM: &str = "You are an expert career advisor and resume consultant. \
    You answer questions about the user's resume and give practical career guidance. \
    Be specific, reference the resume where relevant, keep answers to 2-4 short paragraphs, \
    and ask a clarifying question when you lack context. \
    Never assume facts that are not in the resume.";

/// Replace `{company}`, `{resume}`, `{authenticity}` and `{layout}`.
pub const COMPANY_FIT_PROMPT: &str = r#"Tailor the following resume for {company}.

Steps:
1. Recall what you know about {company}'s culture, values and hiring patterns.
2. Identify the qualities and skills they prioritise.
3. Restructure and reword the resume to emphasise the most relevant experience.
4. Match the language and tone to the company's culture.
5. Highlight achievements aligned with the company's values.

{authenticity}

{layout}

Current resume:
{resume}"#;

/// Replace `{job_description}`, `{resume}`, `{authenticity}` and `{layout}`.
pub const JOB_MATCH_PROMPT: &str = r#"Restructure the following resume to maximise its match with the job description.

Steps:
1. Extract the key requirements from the job description.
2. Identify matching experience and skills in the resume.
3. Move the most relevant experience first.
4. Work keywords from the job description in naturally.
5. Keep the formatting ATS-friendly.

{authenticity}

{layout}

Job description:
{job_description}

Current resume:
{resume}"#;

/// Replace `{job_description}` and `{resume}`.
pub const MATCH_ANALYSIS_PROMPT: &str = r#"Calculate how well this resume matches the job description.

Provide:
1. An overall match line in the exact form "Score: N/100"
2. A breakdown: skills match (%), experience match (%), education match (%), keyword coverage (%)
3. Matched qualifications
4. Skill gaps
5. Recommendations to improve the score

Job description:
{job_description}

Resume:
{resume}"#;

/// Replace `{section}`, `{guidelines}`, `{request}`, `{context}`, `{content}`,
/// `{authenticity}`.
pub const SECTION_ENHANCE_PROMPT: &str = r#"Enhance the {section} section of a resume so it is more impactful.

{guidelines}

User request: {request}

Related resume context:
{context}

{authenticity}

Return the complete rewritten {section} section content first (without the section heading).
After it, under a heading 'Key Changes', explain the most important improvements.

Current {section} content:
{content}"#;

/// Replace `{history}`, `{resume}` and `{query}`.
pub const GENERAL_PROMPT: &str = r#"Previous conversation:
{history}

The user's current resume:
{resume}

User question:
{query}"#;

/// Section-type writing guidance, matched against the resolved section name.
pub const SECTION_GUIDELINES: &[(&str, &str)] = &[
    (
        "SUMMARY",
        "- Start with strong action words\n\
         - Include 2-3 key strengths\n\
         - Quantify experience (years, achievements)\n\
         - Tailor to the target role\n\
         - Keep to 3-4 impactful sentences",
    ),
    (
        "EXPERIENCE",
        "- Use strong action verbs (Led, Developed, Managed)\n\
         - Quantify achievements with metrics (%, $, numbers)\n\
         - Follow the STAR method (Situation, Task, Action, Result)\n\
         - Focus on impact and results\n\
         - Include relevant keywords",
    ),
    (
        "SKILLS",
        "- Organise by category (Technical, Soft, Tools)\n\
         - Put the most relevant skills first\n\
         - Include proficiency levels where useful\n\
         - Use industry-standard terminology\n\
         - Balance hard and soft skills",
    ),
    (
        "EDUCATION",
        "- Include degree, institution and graduation date\n\
         - Add GPA only if strong\n\
         - Highlight relevant coursework\n\
         - Include honours and awards\n\
         - Add certifications",
    ),
    (
        "PROJECTS",
        "- Describe the problem and the solution\n\
         - Name the technologies used\n\
         - Quantify impact or results\n\
         - Include links if available\n\
         - Show leadership and collaboration",
    ),
];

pub const DEFAULT_GUIDELINES: &str =
    "General guidelines: use action verbs, quantify achievements, focus on impact.";
