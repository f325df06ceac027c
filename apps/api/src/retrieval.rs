//! Context Retriever: confidence-gated selection of session context from the index.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::index::SemanticIndex;

#[derive(Clone)]
pub struct ContextRetriever {
    index: Arc<dyn SemanticIndex>,
    distance_threshold: f64,
    top_k: usize,
}

impl ContextRetriever {
    pub fn new(index: Arc<dyn SemanticIndex>, distance_threshold: f64, top_k: usize) -> Self {
        Self {
            index,
            distance_threshold,
            top_k,
        }
    }

    /// Returns the top chunks joined by blank lines, or `None` when the best
    /// match is not strictly closer than the threshold. Index failures are `None`.
    pub async fn retrieve(&self, query: &str, session_id: Uuid) -> Option<String> {
        let hits = match self.index.search(query, Some(session_id), self.top_k).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Retrieval failed for session {session_id}, using full document: {e}");
                return None;
            }
        };

        let best = hits.first()?;
        if best.distance >= self.distance_threshold {
            debug!(
                "Best match distance {:.3} >= {:.3}, context insufficient",
                best.distance, self.distance_threshold
            );
            return None;
        }

        let context = hits
            .iter()
            .map(|h| h.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        debug!(
            "Retrieved {} chunks (best distance {:.3})",
            hits.len(),
            best.distance
        );
        Some(context)
    }
}
