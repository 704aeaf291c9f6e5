pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::session::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/sessions", post(handlers::handle_create_session))
        .route(
            "/api/v1/sessions/:id",
            get(handlers::handle_get_session).delete(handlers::handle_delete_session),
        )
        .route(
            "/api/v1/sessions/:id/documents",
            post(handlers::handle_upload_documents),
        )
        .route("/api/v1/sessions/:id/run", post(handlers::handle_run_session))
        .route(
            "/api/v1/sessions/:id/reset",
            post(handlers::handle_reset_session),
        )
        .route(
            "/api/v1/sessions/:id/results",
            get(handlers::handle_list_results),
        )
        .route(
            "/api/v1/sessions/:id/results/:document_id",
            get(handlers::handle_get_result),
        )
        .with_state(state)
}
