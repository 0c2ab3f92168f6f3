pub mod channels;
pub mod config;
pub mod crm;
pub mod inbox;
pub mod ingest;
pub mod jobs;
pub mod llm;
pub mod notify;
pub mod responder;
pub mod security;
pub mod settings;
pub mod shared;
pub mod tests;
pub mod webhooks;

use crate::shared::state::AppState;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Assembles every module's routes into the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(webhooks::configure())
        .merge(inbox::configure())
        .merge(crm::configure())
        .merge(settings::configure())
        .merge(notify::configure())
        .merge(jobs::configure())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
