// HTTP routes configuration
// Author: kelexine (https://github.com/kelexine)

use super::handlers::{
    cache_stats_handler, generate_handler, health_handler, metrics_handler, sweep_handler,
};
use super::middleware::request_id_layers;
use crate::config::AppConfig;
use crate::error::Result;
use crate::governance::GovernedGenerationService;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub service: Arc<GovernedGenerationService>,
}

pub fn create_router(config: AppConfig, service: Arc<GovernedGenerationService>) -> Result<Router> {
    let state = AppState {
        config: Arc::new(config),
        service,
    };

    let (set_request_id, propagate_request_id) = request_id_layers();

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/v1/generate/:request_type", post(generate_handler))
        .route("/v1/cache/stats", get(cache_stats_handler))
        .route("/v1/maintenance/sweep", post(sweep_handler))
        // Prompts are text; 1MB is plenty
        .layer(tower_http::limit::RequestBodyLimitLayer::new(1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id)
        .layer(set_request_id)
        .with_state(state);

    Ok(app)
}
