//! Axum-based HTTP server for the generation guard.
//!
//! This module exposes the governed generation path over HTTP, together
//! with cache statistics, a manual maintenance trigger, health and
//! Prometheus metrics.
//!
//! # Components
//!
//! - `handlers`: Implementation of individual API endpoints (generate, health, metrics).
//! - `middleware`: Request ID tracking layers.
//! - `routes`: The main router configuration that ties everything together.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod handlers;
mod middleware;
mod routes;

pub use handlers::USER_ID_HEADER;
pub use routes::{create_router, AppState};
