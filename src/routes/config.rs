use crate::db::ConfigStore;
use crate::middleware::auth::AuthUser;
use crate::models::AppState;
use crate::platforms::PlatformConfig;
use crate::types::{AppError, AppResult, Platform};
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::info;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/config", get(get_all_configs))
        .route("/api/config/{platform}", get(get_config))
        .route("/api/config/{platform}", post(save_config))
        .with_state(state)
}

fn parse_platform(platform: &str) -> AppResult<Platform> {
    Platform::from_id(platform).ok_or_else(|| AppError::InvalidPlatform(platform.to_string()))
}

async fn get_all_configs(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<serde_json::Value>> {
    let store = ConfigStore::new(state.pool.clone());
    let configs = store.all(auth.id).await?;
    Ok(Json(serde_json::Value::Object(configs)))
}

async fn get_config(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(platform): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let platform = parse_platform(&platform)?;
    let store = ConfigStore::new(state.pool.clone());
    let config = store.get(auth.id, platform).await?;
    let value = match config {
        Some(config) => serde_json::to_value(&config)
            .map_err(|e| AppError::Internal(format!("failed to serialize config: {}", e)))?,
        None => serde_json::json!({}),
    };
    Ok(Json(value))
}

async fn save_config(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(platform): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> AppResult<Json<serde_json::Value>> {
    let platform = parse_platform(&platform)?;
    if !body.is_object() {
        return Err(AppError::InvalidRequest("invalid config data".to_string()));
    }

    let config = PlatformConfig::parse(platform, body)
        .map_err(|e| AppError::InvalidRequest(format!("invalid {} config: {}", platform, e)))?;

    let store = ConfigStore::new(state.pool.clone());
    store.set(auth.id, platform, &config).await?;

    info!(user = auth.id, platform = %platform, "config saved");
    Ok(Json(serde_json::json!({"message": "Config saved successfully"})))
}
