use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::static_files::static_handler;
use super::state::AppState;

// UI Routes - web interface
pub fn ui_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::ui::index_handler))
        .route("/static/{*path}", get(static_handler))
}

// API Routes - the question pipeline and admin actions
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ask", post(handlers::api::ask))
        .route("/refresh-schema", post(handlers::api::refresh_schema))
        .route("/test-query", post(handlers::api::test_query))
        .route("/api/status", get(handlers::api::system_status))
}
