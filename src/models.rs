use crate::config::Config;
use crate::gateway::StorageGateway;
use crate::platforms::Coordinates;
use crate::types::{AppError, AppResult, Platform};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub gateway: Arc<StorageGateway>,
}

// Note: FromRow is needed for runtime query_as (without DATABASE_URL at compile time)

/// One registry row. `coordinates` holds the adapter-returned JSON verbatim;
/// everything else is display metadata.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, sqlx::FromRow)]
pub struct FileRecord {
    pub id: String,
    pub backend: String,
    pub coordinates: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub upload_ip: String,
    pub upload_timestamp: i64,
    pub label: String,
    pub directory: String,
    pub tags: String,
    pub created_at: String,
    pub updated_at: String,
}

impl FileRecord {
    pub fn platform(&self) -> AppResult<Platform> {
        Platform::from_id(&self.backend)
            .ok_or_else(|| AppError::InvalidPlatform(self.backend.clone()))
    }

    pub fn coords(&self) -> AppResult<Coordinates> {
        serde_json::from_str(&self.coordinates).map_err(|e| {
            AppError::Internal(format!("corrupt coordinates for {}: {}", self.id, e))
        })
    }
}

/// Listing row; serialized field names match what the frontend expects.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct FileSummary {
    #[serde(rename = "file_id")]
    pub id: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    #[serde(rename = "platform")]
    pub backend: String,
    pub upload_timestamp: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

// API Request/Response types

#[derive(Debug, serde::Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, serde::Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserInfo,
}

#[derive(Debug, serde::Serialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub file_id: String,
    pub platform: String,
    pub file_name: String,
    pub file_size: i64,
    pub content_type: String,
    pub access_url: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, serde::Serialize)]
pub struct FileListResponse {
    pub files: Vec<FileSummary>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, serde::Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}
