//! Task dispatch: per-agent policies wrapped around the task handlers.
//!
//! Each policy checks its required input, runs the handler, splits the output
//! and decides whether the result is plausible for the context it was given.
//! Too-short output produced from retrieved context comes back as
//! `HandlerOutcome::NeedsFullContext` so the orchestrator can retry once.

use std::sync::LazyLock;

use regex::Regex;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::orchestrator::OrchestratorSettings;
use super::outcome::{HandlerFailure, HandlerOutcome, HandlerSuccess};
use super::scoring::extract_match_score;
use super::section_match::SectionResolver;
use crate::document::Sections;
use crate::handlers::{ConversationTurn, HandlerError, HandlerSet, HandlerTask};
use crate::routing::{AgentType, RouteDecision, ENTITY_COMPANY, ENTITY_SECTION};
use crate::splitter::NarrationSplitter;

pub const FIELD_JOB_DESCRIPTION: &str = "job_description";

static GREETING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(hello|hi|hey|greetings|good morning|good afternoon)\b")
        .expect("Invalid greeting regex")
});

/// Greeting documents shorter than this are treated as "nothing uploaded".
const GREETING_DOCUMENT_MIN_CHARS: usize = 100;

const GREETING_WITH_DOCUMENT: &str = "Hello! I'm your resume optimization assistant, and your resume is loaded.

I can help you with:
• **Company Optimization** - tailor your resume for a specific company
• **Job Matching** - optimize against a job description and score the match
• **Section Enhancement** - make a single section more impactful
• **Questions & Advice** - answer questions about your resume or career

What would you like to work on?";

const GREETING_WITHOUT_DOCUMENT: &str = "Hello! I'm your resume optimization assistant.

Upload your resume (PDF or text) to get started. Once it is loaded I can:
• Optimize it for a specific company
• Match it against a job description
• Enhance individual sections
• Answer questions about resume best practices";

const CAPABILITIES_MENU: &str = "I can help you optimize your resume in several ways:

1. **Company Optimization**: tailor your resume for a specific company (e.g. \"Optimize for Google\")
2. **Job Matching**: paste a job description and I'll match your resume to it and score the fit
3. **Section Enhancement**: improve one section with stronger language and quantification

What would you like to do?";

const ASK_COMPANY: &str =
    "I'd be happy to optimize your resume for a company! Which company are you targeting?";
const ASK_JOB_DESCRIPTION: &str =
    "Please provide the job description you'd like to match your resume against.";
const ASK_SECTION: &str =
    "Which section would you like me to enhance? (e.g., Experience, Skills, Summary)";

/// One handler invocation.
#[derive(Debug, Clone, Copy)]
pub struct DispatchRequest<'a> {
    pub query: &'a str,
    pub decision: &'a RouteDecision,
    /// Retrieved context when `used_rag`, otherwise the full document.
    pub document_text: &'a str,
    /// The latest version's full text.
    pub full_text: &'a str,
    pub used_rag: bool,
    pub conversation: &'a [ConversationTurn],
    /// Section resolved on an earlier attempt of the same query.
    pub resolved_section: &'a OnceCell<String>,
}

pub fn is_greeting(query: &str) -> bool {
    GREETING.is_match(query)
}

pub struct Dispatcher {
    handlers: HandlerSet,
    splitter: NarrationSplitter,
    resolver: SectionResolver,
    settings: OrchestratorSettings,
}

impl Dispatcher {
    pub fn new(
        handlers: HandlerSet,
        splitter: NarrationSplitter,
        resolver: SectionResolver,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            handlers,
            splitter,
            resolver,
            settings,
        }
    }

    /// Exhaustive over agent types; never panics and never returns `Err`.
    pub async fn dispatch(&self, req: &DispatchRequest<'_>) -> HandlerOutcome {
        debug!(
            "Dispatching to {} (used_rag={}, {} chars)",
            req.decision.agent_type.as_str(),
            req.used_rag,
            req.document_text.len()
        );
        match req.decision.agent_type {
            AgentType::CompanyFit => self.company_fit(req).await,
            AgentType::JobMatch => self.job_match(req).await,
            AgentType::SectionEnhance => self.section_enhance(req).await,
            AgentType::General => self.general(req).await,
        }
    }

    async fn company_fit(&self, req: &DispatchRequest<'_>) -> HandlerOutcome {
        let Some(company) = req.decision.entity(ENTITY_COMPANY) else {
            return HandlerOutcome::NeedsInput {
                field: ENTITY_COMPANY,
                prompt: ASK_COMPANY.to_string(),
            };
        };

        let task = HandlerTask {
            description: req.query,
            primary_text: req.document_text,
            context_text: None,
            entities: &req.decision.entities,
            conversation: req.conversation,
        };
        let raw = match self.handlers.company_fit.run(&task).await {
            Ok(raw) => raw,
            Err(e) => return handler_failed(e, req.used_rag),
        };

        let split = self.splitter.split(&raw).await;
        if req.used_rag && split.document.len() < self.settings.full_document_floor {
            return HandlerOutcome::NeedsFullContext;
        }

        let mut response = format!("I've optimized your resume for {company}.");
        if !split.narration.is_empty() {
            response.push_str(&format!("\n\n**Key Changes:**\n{}", split.narration));
        }

        HandlerOutcome::Success(HandlerSuccess {
            response,
            updated_document: non_empty(split.document),
            version_label: Some(format!("Optimized for {company}")),
            improvements: non_empty(split.narration),
            match_score: None,
        })
    }

    async fn job_match(&self, req: &DispatchRequest<'_>) -> HandlerOutcome {
        // A short query is a request to match, not the job description itself
        if req.query.chars().count() <= self.settings.job_description_min_chars {
            return HandlerOutcome::NeedsInput {
                field: FIELD_JOB_DESCRIPTION,
                prompt: ASK_JOB_DESCRIPTION.to_string(),
            };
        }

        let analysis = match self
            .handlers
            .match_analyzer
            .analyze(req.document_text, req.query)
            .await
        {
            Ok(analysis) => analysis,
            Err(e) => return handler_failed(e, req.used_rag),
        };

        let task = HandlerTask {
            description: req.query,
            primary_text: req.document_text,
            context_text: None,
            entities: &req.decision.entities,
            conversation: req.conversation,
        };
        let raw = match self.handlers.job_match.run(&task).await {
            Ok(raw) => raw,
            Err(e) => return handler_failed(e, req.used_rag),
        };

        let split = self.splitter.split(&raw).await;
        if req.used_rag && split.document.len() < self.settings.full_document_floor {
            return HandlerOutcome::NeedsFullContext;
        }

        let mut response = format!("**Match Analysis:**\n{analysis}\n\n");
        if split.narration.is_empty() {
            response.push_str("I've optimized your resume to better match the job description.");
        } else {
            response.push_str(&format!("**Optimization Changes:**\n{}", split.narration));
        }

        HandlerOutcome::Success(HandlerSuccess {
            response,
            updated_document: non_empty(split.document),
            version_label: Some("Job Description Match".to_string()),
            improvements: non_empty(split.narration),
            match_score: Some(extract_match_score(&analysis)),
        })
    }

    async fn section_enhance(&self, req: &DispatchRequest<'_>) -> HandlerOutcome {
        let Some(requested) = req.decision.entity(ENTITY_SECTION) else {
            return HandlerOutcome::NeedsInput {
                field: ENTITY_SECTION,
                prompt: ASK_SECTION.to_string(),
            };
        };

        // Sections always come from the full document so the rest of it can be
        // reassembled untouched.
        let mut sections = Sections::parse(req.full_text);
        let headers = sections.headers();
        let section = match req
            .resolved_section
            .get_or_try_init(|| self.resolver.resolve(requested, &headers))
            .await
        {
            Ok(section) => section.clone(),
            Err(failure) => return HandlerOutcome::Error(HandlerFailure::Resolution(failure)),
        };
        let current = sections.get(&section).unwrap_or_default().to_string();

        let mut entities = req.decision.entities.clone();
        entities.insert(ENTITY_SECTION.to_string(), section.clone());
        let task = HandlerTask {
            description: req.query,
            primary_text: &current,
            context_text: req.used_rag.then_some(req.document_text),
            entities: &entities,
            conversation: req.conversation,
        };
        let raw = match self.handlers.section_enhance.run(&task).await {
            Ok(raw) => raw,
            Err(e) => return handler_failed(e, req.used_rag),
        };

        let split = self.splitter.split(&raw).await;
        if req.used_rag && split.document.len() < self.settings.section_floor {
            return HandlerOutcome::NeedsFullContext;
        }
        if split.document.is_empty() {
            return HandlerOutcome::Error(HandlerFailure::Handler(format!(
                "The rewritten {section} section came back empty"
            )));
        }

        sections.replace(&section, &split.document);

        let mut response = format!("I've enhanced your {section} section.");
        if !split.narration.is_empty() {
            response.push_str(&format!("\n\n**Improvements Made:**\n{}", split.narration));
        }
        response.push_str(&format!("\n\n**Enhanced Section:**\n{}", split.document));

        HandlerOutcome::Success(HandlerSuccess {
            response,
            updated_document: Some(sections.render()),
            version_label: Some(format!("Enhanced {section}")),
            improvements: non_empty(split.narration),
            match_score: None,
        })
    }

    async fn general(&self, req: &DispatchRequest<'_>) -> HandlerOutcome {
        if is_greeting(req.query) {
            let greeting = if req.full_text.len() > GREETING_DOCUMENT_MIN_CHARS {
                GREETING_WITH_DOCUMENT
            } else {
                GREETING_WITHOUT_DOCUMENT
            };
            return HandlerOutcome::Success(HandlerSuccess::reply(greeting));
        }

        let skip = req
            .conversation
            .len()
            .saturating_sub(self.settings.history_turns);
        let task = HandlerTask {
            description: req.query,
            primary_text: req.document_text,
            context_text: None,
            entities: &req.decision.entities,
            conversation: &req.conversation[skip..],
        };

        match self.handlers.general.run(&task).await {
            Ok(answer) => HandlerOutcome::Success(HandlerSuccess::reply(answer)),
            Err(e) => {
                warn!("General handler failed, replying with capabilities menu: {e}");
                HandlerOutcome::Success(HandlerSuccess::reply(CAPABILITIES_MENU))
            }
        }
    }
}

fn handler_failed(e: HandlerError, used_rag: bool) -> HandlerOutcome {
    if used_rag {
        warn!("Handler failed on retrieved context, requesting full document: {e}");
        HandlerOutcome::NeedsFullContext
    } else {
        HandlerOutcome::Error(HandlerFailure::Handler(e.to_string()))
    }
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::*;
    use crate::testing::{
        CountingAnalyzer, FailingCompletion, ScriptedCompletion, StaticAnalyzer, StaticHandler,
    };

    const RESUME: &str = "Jane Doe\njane@example.com\n\nSUMMARY: Backend engineer with eight years of experience.\nSKILLS: Rust, Go, Postgres";

    struct Fixture {
        company_fit: Arc<StaticHandler>,
        job_match: Arc<StaticHandler>,
        section_enhance: Arc<StaticHandler>,
        general: Arc<StaticHandler>,
        analyzer: Arc<CountingAnalyzer>,
    }

    impl Fixture {
        fn new(output: &str) -> Self {
            Self {
                company_fit: Arc::new(StaticHandler::new(output)),
                job_match: Arc::new(StaticHandler::new(output)),
                section_enhance: Arc::new(StaticHandler::new(output)),
                general: Arc::new(StaticHandler::new(output)),
                analyzer: Arc::new(CountingAnalyzer::default()),
            }
        }

        fn dispatcher(&self) -> Dispatcher {
            self.dispatcher_with_matcher(Arc::new(ScriptedCompletion::new(vec!["NONE"])))
        }

        fn dispatcher_with_matcher(&self, matcher: Arc<ScriptedCompletion>) -> Dispatcher {
            let handlers = HandlerSet {
                company_fit: self.company_fit.clone(),
                job_match: self.job_match.clone(),
                match_analyzer: self.analyzer.clone(),
                section_enhance: self.section_enhance.clone(),
                general: self.general.clone(),
            };
            Dispatcher::new(
                handlers,
                NarrationSplitter::new(Arc::new(FailingCompletion)),
                SectionResolver::standard(matcher),
                OrchestratorSettings::default(),
            )
        }
    }

    fn decision(agent_type: AgentType, entities: &[(&str, &str)]) -> RouteDecision {
        RouteDecision {
            agent_type,
            confidence: 0.9,
            reasoning: "test".to_string(),
            entities: entities
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            needs_follow_up: false,
        }
    }

    fn request<'a>(
        query: &'a str,
        decision: &'a RouteDecision,
        document_text: &'a str,
        used_rag: bool,
    ) -> DispatchRequest<'a> {
        DispatchRequest {
            query,
            decision,
            document_text,
            full_text: RESUME,
            used_rag,
            conversation: &[],
            resolved_section: Box::leak(Box::new(OnceCell::new())),
        }
    }

    fn delimited(document: &str, narration: &str) -> String {
        format!("===RESUME_CONTENT===\n{document}\n===IMPROVEMENTS===\n{narration}\n===END===")
    }

    #[test]
    fn test_greeting_matches_whole_words_only() {
        assert!(is_greeting("Hi there"));
        assert!(is_greeting("good morning!"));
        assert!(!is_greeting("this is my resume"));
        assert!(!is_greeting("Which skills should I add?"));
    }

    #[tokio::test]
    async fn test_company_fit_without_company_needs_input() {
        let fixture = Fixture::new("unused");
        let decision = decision(AgentType::CompanyFit, &[]);
        let outcome = fixture
            .dispatcher()
            .dispatch(&request("Tailor my resume", &decision, RESUME, false))
            .await;

        assert!(matches!(
            outcome,
            HandlerOutcome::NeedsInput { field: ENTITY_COMPANY, .. }
        ));
        assert_eq!(fixture.company_fit.calls(), 0);
    }

    #[tokio::test]
    async fn test_company_fit_labels_version_with_company() {
        let document = "x".repeat(250);
        let fixture = Fixture::new(&delimited(&document, "Led with payments work"));
        let decision = decision(AgentType::CompanyFit, &[(ENTITY_COMPANY, "Stripe")]);

        let outcome = fixture
            .dispatcher()
            .dispatch(&request("Optimize for Stripe", &decision, RESUME, false))
            .await;

        let HandlerOutcome::Success(success) = outcome else {
            panic!("expected success, got {outcome:?}");
        };
        assert_eq!(success.version_label.as_deref(), Some("Optimized for Stripe"));
        assert_eq!(success.updated_document.as_deref(), Some(document.as_str()));
        assert!(success.response.contains("**Key Changes:**\nLed with payments work"));
    }

    #[tokio::test]
    async fn test_short_output_from_retrieved_context_requests_full_document() {
        let fixture = Fixture::new(&delimited("too short", ""));
        let decision = decision(AgentType::CompanyFit, &[(ENTITY_COMPANY, "Stripe")]);

        let outcome = fixture
            .dispatcher()
            .dispatch(&request("Optimize for Stripe", &decision, "SKILLS\nRust", true))
            .await;
        assert_eq!(outcome, HandlerOutcome::NeedsFullContext);
    }

    #[tokio::test]
    async fn test_short_output_from_full_document_is_accepted() {
        let fixture = Fixture::new(&delimited("too short", ""));
        let decision = decision(AgentType::CompanyFit, &[(ENTITY_COMPANY, "Stripe")]);

        let outcome = fixture
            .dispatcher()
            .dispatch(&request("Optimize for Stripe", &decision, RESUME, false))
            .await;
        assert!(matches!(outcome, HandlerOutcome::Success(_)));
    }

    #[tokio::test]
    async fn test_handler_error_depends_on_context_source() {
        let mut fixture = Fixture::new("unused");
        fixture.company_fit = Arc::new(StaticHandler::failing("model overloaded"));
        let decision = decision(AgentType::CompanyFit, &[(ENTITY_COMPANY, "Stripe")]);
        let dispatcher = fixture.dispatcher();

        let outcome = dispatcher
            .dispatch(&request("Optimize for Stripe", &decision, "chunk", true))
            .await;
        assert_eq!(outcome, HandlerOutcome::NeedsFullContext);

        let outcome = dispatcher
            .dispatch(&request("Optimize for Stripe", &decision, RESUME, false))
            .await;
        assert!(matches!(
            outcome,
            HandlerOutcome::Error(HandlerFailure::Handler(ref msg)) if msg.contains("model overloaded")
        ));
    }

    #[tokio::test]
    async fn test_job_match_needs_a_job_description() {
        let fixture = Fixture::new("unused");
        let decision = decision(AgentType::JobMatch, &[]);
        let outcome = fixture
            .dispatcher()
            .dispatch(&request("Match me to this job", &decision, RESUME, false))
            .await;

        assert!(matches!(
            outcome,
            HandlerOutcome::NeedsInput { field: FIELD_JOB_DESCRIPTION, .. }
        ));
        assert_eq!(fixture.analyzer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fixture.job_match.calls(), 0);
    }

    #[tokio::test]
    async fn test_job_match_scores_and_revises() {
        let document = "y".repeat(300);
        let fixture = Fixture::new(&delimited(&document, ""));
        let handlers = HandlerSet {
            company_fit: fixture.company_fit.clone(),
            job_match: fixture.job_match.clone(),
            match_analyzer: Arc::new(StaticAnalyzer("Score: 78/100\nStrong backend overlap")),
            section_enhance: fixture.section_enhance.clone(),
            general: fixture.general.clone(),
        };
        let dispatcher = Dispatcher::new(
            handlers,
            NarrationSplitter::new(Arc::new(FailingCompletion)),
            SectionResolver::standard(Arc::new(FailingCompletion)),
            OrchestratorSettings::default(),
        );
        let job_description = "Senior Rust engineer. ".repeat(20);
        let decision = decision(AgentType::JobMatch, &[]);

        let outcome = dispatcher
            .dispatch(&request(&job_description, &decision, RESUME, false))
            .await;

        let HandlerOutcome::Success(success) = outcome else {
            panic!("expected success, got {outcome:?}");
        };
        assert_eq!(success.match_score, Some(78));
        assert_eq!(success.version_label.as_deref(), Some("Job Description Match"));
        assert!(success.response.starts_with("**Match Analysis:**\nScore: 78/100"));
        assert!(success.response.ends_with("better match the job description."));
    }

    #[tokio::test]
    async fn test_section_enhance_replaces_only_the_resolved_section() {
        let skills = "Languages: Rust, Go, TypeScript | Data: Postgres, Redis, Kafka";
        let fixture = Fixture::new(&delimited(skills, "Grouped by category"));
        let decision = decision(AgentType::SectionEnhance, &[(ENTITY_SECTION, "skill set")]);

        let outcome = fixture
            .dispatcher()
            .dispatch(&request("Improve my skill set", &decision, RESUME, false))
            .await;

        let HandlerOutcome::Success(success) = outcome else {
            panic!("expected success, got {outcome:?}");
        };
        let updated = success.updated_document.unwrap();
        assert!(updated.contains(skills));
        assert!(updated.contains("Backend engineer with eight years of experience."));
        assert!(!updated.contains("Rust, Go, Postgres\n"));
        assert_eq!(success.version_label.as_deref(), Some("Enhanced SKILLS"));
        assert!(success.response.contains("**Enhanced Section:**"));
        assert_eq!(fixture.section_enhance.primary_texts(), vec!["Rust, Go, Postgres"]);
    }

    #[tokio::test]
    async fn test_section_enhance_unknown_section_lists_available() {
        let fixture = Fixture::new("unused");
        let decision = decision(AgentType::SectionEnhance, &[(ENTITY_SECTION, "xyz123")]);

        let outcome = fixture
            .dispatcher()
            .dispatch(&request("Improve xyz123", &decision, RESUME, false))
            .await;

        let HandlerOutcome::Error(HandlerFailure::Resolution(failure)) = outcome else {
            panic!("expected resolution failure, got {outcome:?}");
        };
        assert_eq!(failure.available, vec!["SUMMARY", "SKILLS"]);
        assert_eq!(fixture.section_enhance.calls(), 0);
    }

    #[tokio::test]
    async fn test_section_is_resolved_once_across_the_full_context_retry() {
        let rewritten = "Languages: Rust, Go, TypeScript and Python across services";
        let mut fixture = Fixture::new("unused");
        fixture.section_enhance = Arc::new(StaticHandler::sequence(vec![Ok("Rust"), Ok(rewritten)]));
        let matcher = Arc::new(ScriptedCompletion::new(vec!["SKILLS"]));
        let dispatcher = fixture.dispatcher_with_matcher(matcher.clone());
        let decision = decision(AgentType::SectionEnhance, &[(ENTITY_SECTION, "abilities")]);

        let mut req = request("Polish my abilities", &decision, "SKILLS: Rust", true);
        assert_eq!(dispatcher.dispatch(&req).await, HandlerOutcome::NeedsFullContext);
        assert_eq!(req.resolved_section.get().map(String::as_str), Some("SKILLS"));

        req.document_text = RESUME;
        req.used_rag = false;
        let HandlerOutcome::Success(success) = dispatcher.dispatch(&req).await else {
            panic!("expected success on the retry");
        };
        assert_eq!(success.version_label.as_deref(), Some("Enhanced SKILLS"));
        assert_eq!(matcher.calls(), 1);
        assert_eq!(fixture.section_enhance.calls(), 2);
    }

    #[tokio::test]
    async fn test_greeting_depends_on_document_length() {
        let fixture = Fixture::new("unused");
        let decision = decision(AgentType::General, &[]);
        let dispatcher = fixture.dispatcher();

        let long = "z".repeat(150);
        let mut req = request("hey", &decision, &long, false);
        req.full_text = &long;
        let HandlerOutcome::Success(success) = dispatcher.dispatch(&req).await else {
            panic!("expected success");
        };
        assert_eq!(success.response, GREETING_WITH_DOCUMENT);

        req.full_text = "";
        let HandlerOutcome::Success(success) = dispatcher.dispatch(&req).await else {
            panic!("expected success");
        };
        assert_eq!(success.response, GREETING_WITHOUT_DOCUMENT);
        assert_eq!(fixture.general.calls(), 0);
    }

    #[tokio::test]
    async fn test_general_failure_degrades_to_menu() {
        let mut fixture = Fixture::new("unused");
        fixture.general = Arc::new(StaticHandler::failing("timeout"));
        let decision = decision(AgentType::General, &[]);

        let outcome = fixture
            .dispatcher()
            .dispatch(&request("Is a two-page resume ok?", &decision, RESUME, false))
            .await;
        assert_eq!(
            outcome,
            HandlerOutcome::Success(HandlerSuccess::reply(CAPABILITIES_MENU))
        );
    }
}
