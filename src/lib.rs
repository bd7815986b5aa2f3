// Relaybed - self-hosted image bed relaying file storage to external platforms

pub mod config;
pub mod db;
pub mod gateway;
pub mod middleware;
pub mod models;
pub mod platforms;
pub mod routes;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;
pub use types::{AppError, AppResult, Platform};

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
