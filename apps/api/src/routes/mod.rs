pub mod health;
pub mod sessions;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/sessions", post(sessions::handle_create_session))
        .route(
            "/api/v1/sessions/text",
            post(sessions::handle_create_text_session),
        )
        .route(
            "/api/v1/sessions/:id",
            get(sessions::handle_get_session).delete(sessions::handle_end_session),
        )
        .route("/api/v1/sessions/:id/query", post(sessions::handle_query))
        .route(
            "/api/v1/sessions/:id/decompose",
            post(sessions::handle_decompose),
        )
        .route(
            "/api/v1/sessions/:id/messages",
            get(sessions::handle_messages),
        )
        .route(
            "/api/v1/sessions/:id/versions",
            get(sessions::handle_versions),
        )
        .route(
            "/api/v1/sessions/:id/versions/:version_id/revert",
            post(sessions::handle_revert),
        )
        .route("/api/v1/sessions/:id/export", post(sessions::handle_export))
        .with_state(state)
}
