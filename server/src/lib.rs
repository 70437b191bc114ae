//! Kanji Classifier HTTP API
//!
//! Exposes classification of uploaded images, training, evaluation on the
//! held-out split and a health check.

pub mod error;
pub mod routes;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, SharedState};

/// Build the router with all routes and middleware
pub fn build_router(state: SharedState) -> Router {
    let body_limit = state.config.server.max_upload_bytes;

    Router::new()
        // Health check
        .route("/health", get(routes::health::health_check))
        // Classification
        .route(
            "/api/Classification/classify_image",
            post(routes::classification::classify_image),
        )
        .route(
            "/api/Classification/reload",
            post(routes::classification::reload_model),
        )
        // Training
        .route("/api/Training/train", get(routes::training::start_training))
        .route(
            "/api/Training/classify",
            get(routes::training::run_test_evaluation),
        )
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
