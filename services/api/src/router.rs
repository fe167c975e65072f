//! Axum Router Configuration

use crate::{bridge::media_stream_handler, handlers, state::AppState};
use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/incoming-call",
            get(handlers::incoming_call).post(handlers::incoming_call),
        )
        .route("/media-stream", get(media_stream_handler))
        .route("/health", get(handlers::health))
        .route("/sessions", get(handlers::list_sessions))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}
