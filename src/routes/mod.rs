//! API Routes
//!
//! This module organizes all HTTP endpoints for the application:
//! - `/api/auth` - Login, password change, identity
//! - `/api/config` - Per-user platform configuration
//! - `/api/files` - Upload, listing, deletion
//! - `/file/{id}` - Public file retrieval
//! - `/api/health` - Health checks

pub mod auth;
pub mod config;
pub mod files;
pub mod health;

use crate::middleware::cors::apply_cors;
use crate::models::AppState;
use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let api_router = Router::new()
        .merge(auth::router(state.clone()))
        .merge(config::router(state.clone()))
        .merge(files::router(state.clone()))
        .merge(health::router());

    let router = Router::new()
        .merge(api_router)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(state.config.server.max_upload_bytes));

    apply_cors(router, &state.config.server.cors_allowed_origins)
}
