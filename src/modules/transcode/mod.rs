use axum::Router;
use axum::routing::{get, post};
use crate::state::AppState;

pub mod capability;
pub mod dto;
pub mod handler;
pub mod model;
pub mod orchestrator;
pub mod progress;
pub mod repository;
pub mod runner;
pub mod thumbnail;

#[cfg(all(test, unix))]
pub mod testutil;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/status", get(handler::get_status))
        .route("/sweep", post(handler::sweep_stuck_jobs))
        .route("/capabilities", get(handler::get_capabilities))
        .route("/capabilities/refresh", post(handler::refresh_capabilities))
        .route("/settings", get(handler::get_settings).put(handler::update_settings))
        .route("/progress/{owner_id}", get(handler::progress_socket))
}
