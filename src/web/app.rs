use super::{AppState, MAX_REQUEST_BODY_BYTES, handlers};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::path::Path;
use tower_http::{
    cors::CorsLayer,
    services::ServeDir,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::Level;

pub fn create_app(state: AppState, static_dir: &Path) -> Router {
    // Configure the router with all API endpoints
    Router::new()
        .route("/api/upload", post(handlers::upload_image))
        .route("/api/print/{job_id}", post(handlers::print_image))
        .route("/api/status/{job_id}", get(handlers::get_job_status))
        // Everything else is the bundled front-end; `/` resolves to index.html
        .fallback_service(ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        // The front-end may be served from another origin during development
        .layer(CorsLayer::permissive())
        // Add tracing for HTTP requests and responses
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().level(Level::INFO)))
        .with_state(state)
}
