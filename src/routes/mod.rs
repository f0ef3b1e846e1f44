//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - wizard and course API under `/api/v1/...`
/// - static frontend from `./static` with index fallback
/// - permissive CORS and a per-request trace layer
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/usage", get(http::http_get_usage))
        // Wizard
        .route("/api/v1/wizard", get(http::http_get_wizard))
        .route("/api/v1/wizard/topic", post(http::http_post_topic))
        .route("/api/v1/wizard/pillar", post(http::http_post_pillar))
        .route("/api/v1/wizard/variation", post(http::http_post_variation))
        .route("/api/v1/wizard/back", post(http::http_post_back))
        .route("/api/v1/wizard/restart", post(http::http_post_restart))
        // Course view + export
        .route("/api/v1/course/view", get(http::http_get_course_view))
        .route("/api/v1/course/module", post(http::http_post_module))
        .route("/api/v1/course/quiz/select", post(http::http_post_select_answer))
        .route("/api/v1/course/quiz/check", post(http::http_post_check_answer))
        .route("/api/v1/course/export", get(http::http_get_export))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .fallback_service(static_service)
}
