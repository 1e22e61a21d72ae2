use super::handlers;
use crate::inference::SharedImageEditor;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::Level;

pub fn create_app(editor: SharedImageEditor, max_upload_bytes: usize) -> Router {
    Router::new()
        // Liveness probe
        .route("/", get(handlers::home))
        // Image editing
        .route("/edit-image", post(handlers::edit_image))
        // Apply a layer to limit the maximum size of request bodies
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        // Any origin may call the API
        .layer(CorsLayer::permissive())
        // Add tracing for HTTP requests and responses
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().level(Level::INFO)))
        // Provide the shared state
        .with_state(editor)
}
