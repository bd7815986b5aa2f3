// Type definitions and enums

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Storage platforms a file can be relayed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Discord,
    HuggingFace,
    Telegram,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Discord, Platform::HuggingFace, Platform::Telegram];

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "discord" => Some(Platform::Discord),
            "huggingface" => Some(Platform::HuggingFace),
            "telegram" => Some(Platform::Telegram),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Discord => "discord",
            Platform::HuggingFace => "huggingface",
            Platform::Telegram => "telegram",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid platform: {0}")]
    InvalidPlatform(String),

    #[error("{0}")]
    ConfigMissing(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("registry error: {0}")]
    Registry(#[from] sqlx::Error),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable error kind, stable across message wording changes.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidPlatform(_) => "invalid_platform",
            AppError::ConfigMissing(_) => "config_missing",
            AppError::Upstream(_) => "upstream_error",
            AppError::NotFound(_) => "not_found",
            AppError::Registry(_) => "registry_error",
            AppError::Auth(_) => "auth_error",
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidPlatform(_)
            | AppError::ConfigMissing(_)
            | AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Registry(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }));
        (self.status(), body).into_response()
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_ids_round_trip() {
        for platform in Platform::ALL {
            assert_eq!(Platform::from_id(platform.as_str()), Some(platform));
        }
        assert_eq!(Platform::from_id("fax"), None);
        assert_eq!(Platform::from_id("Discord"), None);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(AppError::InvalidPlatform("fax".into()).kind(), "invalid_platform");
        assert_eq!(AppError::Upstream("timeout".into()).kind(), "upstream_error");
        assert_eq!(AppError::NotFound("x".into()).kind(), "not_found");
    }
}
