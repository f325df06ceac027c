//! Orchestration engine: session lifecycle, the query pipeline and the
//! per-agent dispatch policies.

pub mod dispatch;
pub mod orchestrator;
pub mod outcome;
pub mod registry;
pub mod scoring;
pub mod section_match;

pub use orchestrator::{
    OrchestratorError, OrchestratorSettings, Services, SessionInfo, SessionStarted,
};
pub use outcome::QueryResult;
pub use registry::SessionRegistry;
