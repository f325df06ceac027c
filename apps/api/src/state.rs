use std::sync::Arc;

use crate::document::DocumentSource;
use crate::export::SessionExporter;
use crate::orchestration::SessionRegistry;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Live orchestrators, one per session, over the shared store and index.
    pub sessions: Arc<SessionRegistry>,
    /// Upload parser. Default: FileDocumentSource (pdf, txt, md).
    pub documents: Arc<dyn DocumentSource>,
    pub exporter: Arc<SessionExporter>,
}
