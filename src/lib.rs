pub mod api;
pub mod auth;
pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod github;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod review;
pub mod webhook;

use axum::{http::StatusCode, response::Json, routing::get, Router};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub use orchestrator::ReviewOrchestrator;
pub use review::ReviewStore;

pub const USER_AGENT: &str = concat!("reviewbotics/", env!("CARGO_PKG_VERSION"));

pub struct AppState {
    pub store: Arc<ReviewStore>,
    pub orchestrator: Arc<ReviewOrchestrator>,
    pub webhook_secret: String,
}

async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "reviewbotics"
    })))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(api::api_router())
        .merge(webhook::webhook_router(state.clone()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
