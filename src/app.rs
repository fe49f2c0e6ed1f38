use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::middleware_layer;
use crate::state::AppState;

/// Builds the API router. All routes require a gateway-authenticated actor.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", post(handlers::sessions::initiate))
        .route("/api/sessions/{session_id}", get(handlers::sessions::get_session))
        .route(
            "/api/sessions/{session_id}/respond",
            post(handlers::sessions::respond),
        )
        .route(
            "/api/sessions/{session_id}/answer",
            post(handlers::sessions::start_or_answer),
        )
        .route(
            "/api/sessions/{session_id}/acknowledge",
            post(handlers::sessions::acknowledge),
        )
        .route(
            "/api/sessions/{session_id}/finish",
            post(handlers::sessions::end_or_finish),
        )
        .route(
            "/api/sessions/{session_id}/cancel",
            post(handlers::sessions::cancel),
        )
        .route(
            "/api/sessions/{session_id}/progress",
            post(handlers::sessions::report_progress),
        )
        .route(
            "/api/notifications/unread",
            get(handlers::notifications::list_unread),
        )
        .route(
            "/api/notifications/{notification_id}/read",
            post(handlers::notifications::mark_read),
        )
        .route("/api/admin/reap", post(handlers::sessions::reap))
        .route_layer(from_fn(middleware_layer::auth::require_actor))
        .with_state(state)
}
