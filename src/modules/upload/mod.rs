use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{post, put};
use crate::state::AppState;
use tower_http::limit::RequestBodyLimitLayer;

pub mod dto;
pub mod handler;
pub mod session;

/// Upper bound for a single chunk body.
pub const MAX_CHUNK_BYTES: usize = 64 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(handler::create_upload))
        .route("/{id}/chunks/{index}", put(handler::upload_chunk))
        .route("/{id}/complete", post(handler::complete_upload))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_CHUNK_BYTES))
}
