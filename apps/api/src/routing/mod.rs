pub mod classifier;
pub mod prompts;

pub use classifier::{AgentType, IntentClassifier, RouteDecision, SubTask, ENTITY_COMPANY, ENTITY_SECTION};
